pub mod matmul;

use crate::backend::ComputeBackend;
use crate::error::{expect_len, ComputeError, Result};

/// Pure-Rust CPU compute backend.
///
/// Straightforward loops; matrix products are split across up to
/// `n_threads` scoped threads once they are large enough to benefit.
#[derive(Debug, Clone)]
pub struct CpuBackend {
    n_threads: usize,
}

impl CpuBackend {
    /// Single-threaded backend.
    pub fn new() -> Self {
        Self::with_threads(1)
    }

    /// Backend using up to `n_threads` workers (at least one).
    pub fn with_threads(n_threads: usize) -> Self {
        CpuBackend {
            n_threads: n_threads.max(1),
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn n_threads(&self) -> usize {
        self.n_threads
    }

    fn matmul(&self, a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Result<Vec<f32>> {
        expect_len("matmul lhs", a.len(), m * k)?;
        expect_len("matmul rhs", b.len(), k * n)?;
        Ok(matmul::matmul_parallel(a, b, m, k, n, self.n_threads))
    }

    fn add(&self, a: &[f32], b: &[f32]) -> Result<Vec<f32>> {
        expect_len("add", b.len(), a.len())?;
        Ok(a.iter().zip(b).map(|(x, y)| x + y).collect())
    }

    fn mul(&self, a: &[f32], b: &[f32]) -> Result<Vec<f32>> {
        expect_len("mul", b.len(), a.len())?;
        Ok(a.iter().zip(b).map(|(x, y)| x * y).collect())
    }

    fn rms_norm(
        &self,
        x: &[f32],
        weight: &[f32],
        eps: f32,
        hidden_size: usize,
    ) -> Result<Vec<f32>> {
        expect_len("rms_norm weight", weight.len(), hidden_size)?;
        if hidden_size == 0 || x.len() % hidden_size != 0 {
            return Err(ComputeError::NotMultiple {
                op: "rms_norm",
                len: x.len(),
                chunk: hidden_size,
            });
        }

        let mut result = Vec::with_capacity(x.len());
        for row in x.chunks_exact(hidden_size) {
            let mean_sq = row.iter().map(|v| v * v).sum::<f32>() / hidden_size as f32;
            let rms = (mean_sq + eps).sqrt();
            result.extend(row.iter().zip(weight).map(|(v, w)| v * w / rms));
        }
        Ok(result)
    }

    fn softmax_in_place(&self, x: &mut [f32]) {
        if x.is_empty() {
            return;
        }
        let max = x.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0f32;
        for v in x.iter_mut() {
            *v = (*v - max).exp();
            sum += *v;
        }
        for v in x.iter_mut() {
            *v /= sum;
        }
    }

    fn rope(
        &self,
        q: &[f32],
        k: &[f32],
        head_dim: usize,
        pos: usize,
        n_heads_q: usize,
        n_heads_k: usize,
        theta_base: f32,
    ) -> Result<(Vec<f32>, Vec<f32>)> {
        if head_dim == 0 {
            return Err(ComputeError::Other("rope: head_dim must be > 0".to_string()));
        }
        expect_len("rope q", q.len(), n_heads_q * head_dim)?;
        expect_len("rope k", k.len(), n_heads_k * head_dim)?;

        // One (cos, sin) pair per rotated dimension pair, shared by every head.
        let angles: Vec<(f32, f32)> = (0..head_dim / 2)
            .map(|i| {
                let freq = 1.0 / theta_base.powf(2.0 * i as f32 / head_dim as f32);
                let theta = pos as f32 * freq;
                (theta.cos(), theta.sin())
            })
            .collect();

        let rotate = |src: &[f32]| -> Vec<f32> {
            let mut out = src.to_vec();
            for head in out.chunks_exact_mut(head_dim) {
                for (i, &(cos, sin)) in angles.iter().enumerate() {
                    let x0 = head[2 * i];
                    let x1 = head[2 * i + 1];
                    head[2 * i] = x0 * cos - x1 * sin;
                    head[2 * i + 1] = x0 * sin + x1 * cos;
                }
            }
            out
        };

        Ok((rotate(q), rotate(k)))
    }

    fn silu(&self, x: &[f32]) -> Result<Vec<f32>> {
        Ok(x.iter().map(|&v| v / (1.0 + (-v).exp())).collect())
    }
}
