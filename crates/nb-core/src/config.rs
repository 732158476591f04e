//! Bridge configuration.
//!
//! Every section deserializes from JSON with per-field defaults, so a config
//! file only names what it changes.

use std::path::Path;

use nb_sampler::{
    ArgMax, DistSampler, RepetitionPenaltySampler, SamplerChain, TemperatureSampler, TokenSelector,
    TopKSampler, TopPSampler,
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV: &str = "NATIVE_BRIDGE_CONFIG";

/// Top-level configuration of a `Bridge`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub model: ModelParams,
    pub session: SessionConfig,
    pub sampling: SamplingConfig,
    pub generation: GenerationDefaults,
}

impl BridgeConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Config from the file named by `NATIVE_BRIDGE_CONFIG`, or defaults when
    /// the variable is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_json_file(path),
            None => Ok(Self::default()),
        }
    }
}

/// How model weights are acquired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    /// Memory-map the weights file.
    pub use_mmap: bool,
    /// Pin weights in RAM. Not supported; must stay false.
    pub use_mlock: bool,
}

impl Default for ModelParams {
    fn default() -> Self {
        ModelParams {
            use_mmap: true,
            use_mlock: false,
        }
    }
}

/// Evaluation context sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Context window in tokens; 0 uses the model's training context.
    pub n_ctx: usize,
    /// Tokens per decode call, clamped to `n_ctx`.
    pub n_batch: usize,
    pub n_threads: usize,
    /// Sequence slots.
    pub n_seq_max: usize,
    /// Seed for stochastic selectors.
    pub seed: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            n_ctx: 2048,
            n_batch: 512,
            n_threads: num_cpus::get(),
            n_seq_max: 1,
            seed: 0xFFFF_FFFF,
        }
    }
}

/// Next-token selection policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// At or below zero selects strict greedy arg-max.
    pub temperature: f32,
    /// 0 disables top-k.
    pub top_k: usize,
    /// 1.0 disables nucleus filtering.
    pub top_p: f32,
    /// 1.0 disables the repetition penalty.
    pub repeat_penalty: f32,
    /// How many recent tokens the penalty looks at.
    pub repeat_last_n: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        SamplingConfig {
            temperature: 0.0,
            top_k: 40,
            top_p: 0.95,
            repeat_penalty: 1.0,
            repeat_last_n: 64,
        }
    }
}

impl SamplingConfig {
    pub fn is_greedy(&self) -> bool {
        self.temperature <= 0.0
    }

    /// Build the selector: `ArgMax` when greedy, otherwise a seeded chain of
    /// repetition penalty, temperature, top-k, top-p and a distribution draw.
    pub fn build_selector(&self, seed: u64) -> Box<dyn TokenSelector> {
        if self.is_greedy() {
            return Box::new(ArgMax);
        }
        let chain = SamplerChain::new(seed)
            .with(Box::new(RepetitionPenaltySampler::new(
                self.repeat_penalty,
                self.repeat_last_n,
            )))
            .with(Box::new(TemperatureSampler::new(self.temperature)))
            .with(Box::new(TopKSampler::new(self.top_k)))
            .with(Box::new(TopPSampler::new(self.top_p)))
            .with(Box::new(DistSampler::new()));
        Box::new(chain)
    }
}

/// Defaults for callers that do not pass a token budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationDefaults {
    pub max_tokens: usize,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        GenerationDefaults { max_tokens: 100 }
    }
}
