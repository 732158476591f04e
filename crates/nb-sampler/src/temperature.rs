use rand::rngs::StdRng;

use crate::sampler::{Sampler, TokenLogit};

/// Divides every logit by the temperature. Values at or below zero are
/// clamped to a tiny positive temperature, which approaches greedy.
pub struct TemperatureSampler {
    temperature: f32,
}

impl TemperatureSampler {
    pub fn new(temperature: f32) -> Self {
        Self { temperature }
    }
}

impl Sampler for TemperatureSampler {
    fn name(&self) -> &str {
        "temperature"
    }

    fn apply(&mut self, logits: &mut Vec<TokenLogit>, _rng: &mut StdRng) {
        let temp = if self.temperature <= 0.0 {
            1e-7
        } else {
            self.temperature
        };
        for token in logits.iter_mut() {
            token.logit /= temp;
        }
    }
}
