use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::selector::TokenSelector;

/// A token ID paired with its logit value.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenLogit {
    pub token_id: u32,
    pub logit: f32,
}

/// One stage of a sampling pipeline.
pub trait Sampler: Send {
    fn name(&self) -> &str;

    /// Filter, rescale or select candidates in place. Stages that draw
    /// randomly use the chain's `rng`.
    fn apply(&mut self, logits: &mut Vec<TokenLogit>, rng: &mut StdRng);

    /// Observe an accepted token.
    fn accept(&mut self, _token: u32) {}

    fn reset(&mut self) {}
}

/// Sort descending by logit; equal logits keep ascending token id order.
pub(crate) fn sort_descending(logits: &mut [TokenLogit]) {
    logits.sort_by(|a, b| b.logit.total_cmp(&a.logit));
}

/// Composes samplers into a seeded pipeline.
///
/// The last stage should be a selector (greedy or distribution); otherwise
/// the first surviving candidate wins. The RNG is reseeded on `reset`, so a
/// chain replays the same draws for the same inputs.
pub struct SamplerChain {
    samplers: Vec<Box<dyn Sampler>>,
    seed: u64,
    rng: StdRng,
}

impl SamplerChain {
    pub fn new(seed: u64) -> Self {
        Self {
            samplers: Vec::new(),
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Add a sampler to the end of the chain.
    pub fn with(mut self, sampler: Box<dyn Sampler>) -> Self {
        self.samplers.push(sampler);
        self
    }

    pub fn len(&self) -> usize {
        self.samplers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samplers.is_empty()
    }

    /// Names of the stages, in order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.samplers.iter().map(|s| s.name()).collect()
    }
}

impl TokenSelector for SamplerChain {
    fn name(&self) -> &str {
        "chain"
    }

    fn select(&mut self, logits: &[f32]) -> Option<u32> {
        let mut token_logits: Vec<TokenLogit> = logits
            .iter()
            .enumerate()
            .filter(|(_, l)| !l.is_nan())
            .map(|(i, &logit)| TokenLogit {
                token_id: i as u32,
                logit,
            })
            .collect();

        for sampler in &mut self.samplers {
            sampler.apply(&mut token_logits, &mut self.rng);
        }
        token_logits.first().map(|t| t.token_id)
    }

    fn accept(&mut self, token: u32) {
        for sampler in &mut self.samplers {
            sampler.accept(token);
        }
    }

    fn reset(&mut self) {
        for sampler in &mut self.samplers {
            sampler.reset();
        }
        self.rng = StdRng::seed_from_u64(self.seed);
    }
}
