use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;

use crate::sampler::{Sampler, TokenLogit};
use crate::selector::TokenSelector;

/// Index of the strictly largest logit: the lowest id wins ties and NaN
/// never wins.
pub fn argmax(logits: &[f32]) -> Option<u32> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &logit) in logits.iter().enumerate() {
        if logit.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, b)| logit > b) {
            best = Some((i, logit));
        }
    }
    best.map(|(i, _)| i as u32)
}

/// Deterministic greedy selection over the raw logits.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArgMax;

impl TokenSelector for ArgMax {
    fn name(&self) -> &str {
        "argmax"
    }

    fn select(&mut self, logits: &[f32]) -> Option<u32> {
        argmax(logits)
    }
}

/// Greedy chain stage: keeps the single highest-logit candidate.
#[derive(Debug, Default)]
pub struct GreedySampler;

impl GreedySampler {
    pub fn new() -> Self {
        Self
    }
}

impl Sampler for GreedySampler {
    fn name(&self) -> &str {
        "greedy"
    }

    fn apply(&mut self, logits: &mut Vec<TokenLogit>, _rng: &mut StdRng) {
        let mut best: Option<usize> = None;
        for (i, t) in logits.iter().enumerate() {
            if !t.logit.is_nan() && best.map_or(true, |b| t.logit > logits[b].logit) {
                best = Some(i);
            }
        }
        if let Some(b) = best {
            logits.swap(0, b);
            logits.truncate(1);
        }
    }
}

/// Distribution draw: softmax over the surviving candidates, then one
/// weighted sample from the chain's RNG.
#[derive(Debug, Default)]
pub struct DistSampler;

impl DistSampler {
    pub fn new() -> Self {
        Self
    }
}

impl Sampler for DistSampler {
    fn name(&self) -> &str {
        "dist"
    }

    fn apply(&mut self, logits: &mut Vec<TokenLogit>, rng: &mut StdRng) {
        if logits.is_empty() {
            return;
        }

        let max_logit = logits
            .iter()
            .map(|t| t.logit)
            .fold(f32::NEG_INFINITY, f32::max);
        let weights: Vec<f32> = logits.iter().map(|t| (t.logit - max_logit).exp()).collect();

        let selected = match WeightedIndex::new(&weights) {
            Ok(dist) => dist.sample(rng),
            // All weights zero or non-finite: fall back to the best candidate.
            Err(_) => {
                let mut greedy = GreedySampler;
                greedy.apply(logits, rng);
                return;
            }
        };
        let chosen = logits.swap_remove(selected);
        logits.clear();
        logits.push(chosen);
    }
}
