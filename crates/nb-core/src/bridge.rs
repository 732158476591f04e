use std::num::NonZeroU64;
use std::path::Path;

use parking_lot::Mutex;
use tracing::{error, info};

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::generate::{GenerationLoop, GenerationResult};
use crate::state::BridgeState;
use crate::store::{ModelHandle, ModelInfo, ModelStore};

/// Text returned by `model_info_text` when nothing is loaded.
pub const NO_MODEL_LOADED: &str = "no model loaded";

struct Inner {
    state: BridgeState,
    last_handle: u64,
    generator: GenerationLoop,
    initialized: bool,
}

/// A model-session bridge.
///
/// Every operation holds one lock for its whole duration, so concurrent
/// callers are serialized and always observe a consistent state. Independent
/// bridges share nothing.
pub struct Bridge {
    config: BridgeConfig,
    inner: Mutex<Inner>,
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        let generator = GenerationLoop::new(config.sampling.build_selector(config.session.seed));
        Bridge {
            config,
            inner: Mutex::new(Inner {
                state: BridgeState::Empty,
                last_handle: 0,
                generator,
                initialized: false,
            }),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Prepare the bridge for use. Idempotent; always succeeds on CPU.
    pub fn initialize(&self) -> bool {
        let mut inner = self.inner.lock();
        if !inner.initialized {
            info!(
                selector = inner.generator.selector_name(),
                n_threads = self.config.session.n_threads,
                "bridge initialized"
            );
            inner.initialized = true;
        }
        true
    }

    /// Load a model and open a session on it.
    ///
    /// Whatever was loaded before is torn down first, so a failed load leaves
    /// the bridge empty.
    pub fn load_model(&self, path: impl AsRef<Path>) -> Result<ModelHandle, BridgeError> {
        let path = path.as_ref();
        let mut inner = self.inner.lock();
        inner.state = std::mem::take(&mut inner.state).teardown();

        inner.last_handle += 1;
        let id = NonZeroU64::new(inner.last_handle).unwrap_or(NonZeroU64::MIN);
        let handle = ModelHandle::new(id);

        let store = match ModelStore::load(path, &self.config.model, handle) {
            Ok(store) => store,
            Err(e) => {
                error!(path = %path.display(), error = %e, "model load failed");
                return Err(e.into());
            }
        };
        match BridgeState::ModelLoaded(store).open_session(&self.config.session) {
            Ok(state) => {
                inner.state = state;
                Ok(handle)
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "session creation failed");
                Err(e.into())
            }
        }
    }

    /// Generate up to `max_tokens` tokens continuing `prompt`.
    pub fn generate(
        &self,
        prompt: &str,
        max_tokens: usize,
    ) -> Result<GenerationResult, BridgeError> {
        self.run(prompt, max_tokens, None)
    }

    /// Like `generate`, calling `on_fragment` with each piece of text as it
    /// is produced.
    pub fn generate_streaming(
        &self,
        prompt: &str,
        max_tokens: usize,
        mut on_fragment: impl FnMut(&str),
    ) -> Result<GenerationResult, BridgeError> {
        self.run(prompt, max_tokens, Some(&mut on_fragment))
    }

    fn run(
        &self,
        prompt: &str,
        max_tokens: usize,
        on_fragment: Option<&mut dyn FnMut(&str)>,
    ) -> Result<GenerationResult, BridgeError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let ready = inner.state.ready_mut().ok_or(BridgeError::NotLoaded)?;
        inner
            .generator
            .run(&mut ready.session, &ready.store, prompt, max_tokens, on_fragment)
    }

    pub fn model_info(&self) -> Option<ModelInfo> {
        self.inner.lock().state.store().map(ModelStore::info)
    }

    /// Model description, or `"no model loaded"`.
    pub fn model_info_text(&self) -> String {
        match self.model_info() {
            Some(info) => info.to_string(),
            None => NO_MODEL_LOADED.to_string(),
        }
    }

    /// Release the session and model. Safe to call any number of times.
    pub fn cleanup(&self) {
        let mut inner = self.inner.lock();
        inner.state = std::mem::take(&mut inner.state).teardown();
    }

    /// True while a model and session are ready for generation.
    pub fn is_loaded(&self) -> bool {
        self.inner.lock().state.is_ready()
    }

    /// Token budget used when callers do not pass one.
    pub fn default_max_tokens(&self) -> usize {
        self.config.generation.max_tokens
    }
}
