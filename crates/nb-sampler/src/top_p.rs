use rand::rngs::StdRng;

use crate::sampler::{sort_descending, Sampler, TokenLogit};

/// Nucleus filtering: keeps the smallest prefix of candidates, by descending
/// logit, whose cumulative probability exceeds `p`. `p >= 1` disables it.
pub struct TopPSampler {
    p: f32,
}

impl TopPSampler {
    pub fn new(p: f32) -> Self {
        Self { p }
    }
}

impl Sampler for TopPSampler {
    fn name(&self) -> &str {
        "top_p"
    }

    fn apply(&mut self, logits: &mut Vec<TokenLogit>, _rng: &mut StdRng) {
        if logits.is_empty() || self.p >= 1.0 {
            return;
        }
        sort_descending(logits);

        let max_logit = logits[0].logit;
        let exps: Vec<f32> = logits.iter().map(|t| (t.logit - max_logit).exp()).collect();
        let sum: f32 = exps.iter().sum();

        let mut cumulative = 0.0f32;
        let mut cutoff = logits.len();
        for (i, e) in exps.iter().enumerate() {
            cumulative += e / sum;
            if cumulative > self.p {
                cutoff = i + 1;
                break;
            }
        }
        logits.truncate(cutoff.max(1));
    }
}
