use std::fmt::Debug;

use crate::error::Result;

/// Operations required by the llama-family forward pass.
///
/// Data is passed in as row-major f32 slices and returned as owned vectors.
/// Implementations must be deterministic: the same inputs always produce
/// bit-identical outputs regardless of thread count.
pub trait ComputeBackend: Send + Sync + Debug {
    /// Returns the name of this backend (e.g. "cpu").
    fn name(&self) -> &str;

    /// Number of worker threads the backend may use per operation.
    fn n_threads(&self) -> usize;

    /// Matrix multiplication: C = A @ B.
    ///
    /// - `a`: row-major data of shape [m, k]
    /// - `b`: row-major data of shape [k, n]
    /// - Returns: row-major data of shape [m, n]
    fn matmul(&self, a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Result<Vec<f32>>;

    /// Element-wise addition.
    fn add(&self, a: &[f32], b: &[f32]) -> Result<Vec<f32>>;

    /// Element-wise multiplication.
    fn mul(&self, a: &[f32], b: &[f32]) -> Result<Vec<f32>>;

    /// RMS normalization over rows of `hidden_size` elements:
    /// `x[i] * weight[i] / sqrt(mean(x^2) + eps)`.
    fn rms_norm(
        &self,
        x: &[f32],
        weight: &[f32],
        eps: f32,
        hidden_size: usize,
    ) -> Result<Vec<f32>>;

    /// In-place softmax over the whole slice.
    fn softmax_in_place(&self, x: &mut [f32]);

    /// Rotary position embedding applied to query and key heads.
    ///
    /// - `q`: [n_heads_q, head_dim], `k`: [n_heads_k, head_dim]
    /// - `theta_base`: frequency base (`rope.freq_base`, usually 10000)
    ///
    /// Returns (rotated_q, rotated_k).
    #[allow(clippy::too_many_arguments)]
    fn rope(
        &self,
        q: &[f32],
        k: &[f32],
        head_dim: usize,
        pos: usize,
        n_heads_q: usize,
        n_heads_k: usize,
        theta_base: f32,
    ) -> Result<(Vec<f32>, Vec<f32>)>;

    /// SiLU activation: x * sigmoid(x).
    fn silu(&self, x: &[f32]) -> Result<Vec<f32>>;
}
