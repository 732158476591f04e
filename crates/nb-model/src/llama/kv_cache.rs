use crate::error::EvalError;

/// Key-value cache for one sequence slot.
///
/// Layout for each layer: `[n_ctx, kv_dim]` row-major, one row per position.
/// Only rows `0..len` hold data.
#[derive(Debug)]
pub struct KvCache {
    k: Vec<Vec<f32>>,
    v: Vec<Vec<f32>>,
    kv_dim: usize,
    n_ctx: usize,
    len: usize,
}

impl KvCache {
    /// Allocate a zeroed cache, reporting allocation failure instead of aborting.
    pub fn try_new(n_layers: usize, kv_dim: usize, n_ctx: usize) -> Result<KvCache, EvalError> {
        let per_layer = n_ctx.checked_mul(kv_dim);
        let bytes = per_layer
            .and_then(|n| n.checked_mul(2 * n_layers))
            .and_then(|n| n.checked_mul(std::mem::size_of::<f32>()))
            .ok_or(EvalError::ContextAllocation { bytes: usize::MAX })?;
        let per_layer = per_layer.unwrap_or_default();

        let alloc = || -> Result<Vec<f32>, EvalError> {
            let mut buf = Vec::new();
            buf.try_reserve_exact(per_layer)
                .map_err(|_| EvalError::ContextAllocation { bytes })?;
            buf.resize(per_layer, 0.0);
            Ok(buf)
        };

        let mut k = Vec::with_capacity(n_layers);
        let mut v = Vec::with_capacity(n_layers);
        for _ in 0..n_layers {
            k.push(alloc()?);
            v.push(alloc()?);
        }

        Ok(KvCache {
            k,
            v,
            kv_dim,
            n_ctx,
            len: 0,
        })
    }

    /// Write key and value vectors for one token at `pos`.
    pub fn update(&mut self, layer: usize, k_data: &[f32], v_data: &[f32], pos: usize) {
        let offset = pos * self.kv_dim;
        self.k[layer][offset..offset + self.kv_dim].copy_from_slice(k_data);
        self.v[layer][offset..offset + self.kv_dim].copy_from_slice(v_data);
        if pos + 1 > self.len {
            self.len = pos + 1;
        }
    }

    /// Keys for positions `0..seq_len`.
    pub fn keys(&self, layer: usize, seq_len: usize) -> &[f32] {
        &self.k[layer][..seq_len * self.kv_dim]
    }

    /// Values for positions `0..seq_len`.
    pub fn values(&self, layer: usize, seq_len: usize) -> &[f32] {
        &self.v[layer][..seq_len * self.kv_dim]
    }

    /// Number of positions stored.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of positions.
    pub fn capacity(&self) -> usize {
        self.n_ctx
    }

    /// Forget every stored position. Stale rows are overwritten before they
    /// are read again.
    pub fn clear(&mut self) {
        self.len = 0;
    }
}
