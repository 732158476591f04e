use std::fmt::Debug;

use nb_compute::ComputeBackend;

use crate::error::EvalError;
use crate::llama::KvCache;

/// A model architecture that can evaluate tokens one position at a time.
///
/// Implementations hold immutable weights only; per-sequence state lives in
/// the `KvCache` passed to `forward`, so one loaded model can back any number
/// of caches.
pub trait ModelArchitecture: Send + Sync + Debug {
    /// Architecture name as stored in `general.architecture`.
    fn name(&self) -> &str;

    fn n_vocab(&self) -> usize;

    fn n_ctx_train(&self) -> usize;

    fn n_embd(&self) -> usize;

    fn n_layers(&self) -> usize;

    fn n_heads(&self) -> usize;

    /// Allocate an empty cache holding up to `n_ctx` positions.
    fn new_cache(&self, n_ctx: usize) -> Result<KvCache, EvalError>;

    /// Evaluate `token` at `pos`, appending its keys/values to `cache`.
    ///
    /// Returns logits over the vocabulary when `want_logits` is set.
    fn forward(
        &self,
        cache: &mut KvCache,
        token: u32,
        pos: usize,
        want_logits: bool,
        backend: &dyn ComputeBackend,
    ) -> Result<Option<Vec<f32>>, EvalError>;
}
