use std::collections::VecDeque;

use rand::rngs::StdRng;

use crate::sampler::{Sampler, TokenLogit};

/// Penalizes tokens among the last `max_history` accepted tokens.
///
/// Positive logits are divided by `penalty`, negative ones multiplied by it.
pub struct RepetitionPenaltySampler {
    penalty: f32,
    recent_tokens: VecDeque<u32>,
    max_history: usize,
}

impl RepetitionPenaltySampler {
    /// `penalty` of 1.0 disables the stage.
    pub fn new(penalty: f32, max_history: usize) -> Self {
        Self {
            penalty,
            recent_tokens: VecDeque::with_capacity(max_history),
            max_history,
        }
    }
}

impl Sampler for RepetitionPenaltySampler {
    fn name(&self) -> &str {
        "repetition_penalty"
    }

    fn apply(&mut self, logits: &mut Vec<TokenLogit>, _rng: &mut StdRng) {
        if self.penalty == 1.0 || self.recent_tokens.is_empty() {
            return;
        }
        for token in logits.iter_mut() {
            if self.recent_tokens.contains(&token.token_id) {
                if token.logit > 0.0 {
                    token.logit /= self.penalty;
                } else {
                    token.logit *= self.penalty;
                }
            }
        }
    }

    fn accept(&mut self, token: u32) {
        if self.max_history == 0 {
            return;
        }
        if self.recent_tokens.len() == self.max_history {
            self.recent_tokens.pop_front();
        }
        self.recent_tokens.push_back(token);
    }

    fn reset(&mut self) {
        self.recent_tokens.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;

    #[test]
    fn test_penalty_sign_handling_and_window() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut sampler = RepetitionPenaltySampler::new(2.0, 2);
        sampler.accept(0);
        sampler.accept(1);
        sampler.accept(2);

        let mut logits = vec![
            TokenLogit { token_id: 0, logit: 4.0 },
            TokenLogit { token_id: 1, logit: 4.0 },
            TokenLogit { token_id: 2, logit: -1.0 },
        ];
        sampler.apply(&mut logits, &mut rng);
        // Token 0 fell out of the two-token window.
        assert_abs_diff_eq!(logits[0].logit, 4.0);
        assert_abs_diff_eq!(logits[1].logit, 2.0);
        assert_abs_diff_eq!(logits[2].logit, -2.0);
    }
}
