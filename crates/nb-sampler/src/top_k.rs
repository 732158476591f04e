use rand::rngs::StdRng;

use crate::sampler::{sort_descending, Sampler, TokenLogit};

/// Keeps the `k` highest-logit candidates. `k == 0` disables the stage.
pub struct TopKSampler {
    k: usize,
}

impl TopKSampler {
    pub fn new(k: usize) -> Self {
        Self { k }
    }
}

impl Sampler for TopKSampler {
    fn name(&self) -> &str {
        "top_k"
    }

    fn apply(&mut self, logits: &mut Vec<TokenLogit>, _rng: &mut StdRng) {
        if self.k == 0 || self.k >= logits.len() {
            return;
        }
        sort_descending(logits);
        logits.truncate(self.k);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_keeps_top_k_with_stable_ties() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut logits: Vec<TokenLogit> = [0.1, 0.9, 0.5, 0.9]
            .iter()
            .enumerate()
            .map(|(i, &logit)| TokenLogit { token_id: i as u32, logit })
            .collect();
        TopKSampler::new(3).apply(&mut logits, &mut rng);
        let ids: Vec<u32> = logits.iter().map(|t| t.token_id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
    }
}
