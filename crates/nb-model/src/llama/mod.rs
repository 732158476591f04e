pub mod config;
pub mod kv_cache;
pub mod layers;

pub use config::LlamaConfig;
pub use kv_cache::KvCache;
pub use layers::{LlamaLayer, LlamaWeights};

use nb_compute::ComputeBackend;

use crate::architecture::ModelArchitecture;
use crate::error::{EvalError, Result};
use crate::gguf::reader::GgufFile;

/// A llama-family transformer (`llama`, `mistral`).
///
/// Weights are immutable after load; all per-sequence state lives in the
/// `KvCache` handed to `forward`.
#[derive(Debug)]
pub struct LlamaModel {
    pub config: LlamaConfig,
    pub weights: LlamaWeights,
}

impl LlamaModel {
    pub fn from_gguf(gguf: &GgufFile, arch: &str) -> Result<LlamaModel> {
        let config = LlamaConfig::from_gguf(&gguf.metadata, arch)?;
        let weights = LlamaWeights::from_gguf(gguf, &config)?;
        Ok(LlamaModel { config, weights })
    }

    /// Attention for one layer over cached positions `0..=pos`, with GQA.
    fn attend(
        &self,
        cache: &KvCache,
        layer: usize,
        q: &[f32],
        pos: usize,
        backend: &dyn ComputeBackend,
    ) -> Vec<f32> {
        let cfg = &self.config;
        let head_dim = cfg.head_dim;
        let kv_dim = cfg.kv_dim();
        let heads_per_kv = cfg.n_heads / cfg.n_kv_heads;
        let seq_len = pos + 1;
        let keys = cache.keys(layer, seq_len);
        let values = cache.values(layer, seq_len);
        let scale = 1.0 / (head_dim as f32).sqrt();

        let mut out = vec![0.0f32; cfg.q_dim()];
        let mut scores = vec![0.0f32; seq_len];
        for h in 0..cfg.n_heads {
            let kv_off = (h / heads_per_kv) * head_dim;
            let q_head = &q[h * head_dim..(h + 1) * head_dim];

            // Causal masking is implicit: the cache holds only positions <= pos.
            for (s, score) in scores.iter_mut().enumerate() {
                let k = &keys[s * kv_dim + kv_off..s * kv_dim + kv_off + head_dim];
                *score = q_head.iter().zip(k).map(|(a, b)| a * b).sum::<f32>() * scale;
            }
            backend.softmax_in_place(&mut scores);

            let head_out = &mut out[h * head_dim..(h + 1) * head_dim];
            for (s, &p) in scores.iter().enumerate() {
                let v = &values[s * kv_dim + kv_off..s * kv_dim + kv_off + head_dim];
                for (o, &x) in head_out.iter_mut().zip(v) {
                    *o += p * x;
                }
            }
        }
        out
    }
}

impl ModelArchitecture for LlamaModel {
    fn name(&self) -> &str {
        &self.config.arch
    }

    fn n_vocab(&self) -> usize {
        self.config.n_vocab
    }

    fn n_ctx_train(&self) -> usize {
        self.config.n_ctx_train
    }

    fn n_embd(&self) -> usize {
        self.config.n_embd
    }

    fn n_layers(&self) -> usize {
        self.config.n_layers
    }

    fn n_heads(&self) -> usize {
        self.config.n_heads
    }

    fn new_cache(&self, n_ctx: usize) -> std::result::Result<KvCache, EvalError> {
        KvCache::try_new(self.config.n_layers, self.config.kv_dim(), n_ctx)
    }

    /// One token through embedding, every layer (attention + SwiGLU FFN with
    /// residuals) and, when `want_logits`, the final norm and LM head.
    fn forward(
        &self,
        cache: &mut KvCache,
        token: u32,
        pos: usize,
        want_logits: bool,
        backend: &dyn ComputeBackend,
    ) -> std::result::Result<Option<Vec<f32>>, EvalError> {
        let cfg = &self.config;
        let n_embd = cfg.n_embd;
        let q_dim = cfg.q_dim();
        let kv_dim = cfg.kv_dim();

        if token as usize >= cfg.n_vocab {
            return Err(EvalError::InvalidToken {
                token,
                n_vocab: cfg.n_vocab,
            });
        }
        if pos >= cache.capacity() {
            return Err(EvalError::ContextExhausted {
                pos,
                n_ctx: cache.capacity(),
            });
        }

        let embd_offset = token as usize * n_embd;
        let mut hidden = self.weights.token_embd[embd_offset..embd_offset + n_embd].to_vec();

        for (layer_idx, layer) in self.weights.layers.iter().enumerate() {
            let normed = backend.rms_norm(&hidden, &layer.attn_norm, cfg.norm_eps, n_embd)?;

            let q = backend.matmul(&layer.wq, &normed, q_dim, n_embd, 1)?;
            let k = backend.matmul(&layer.wk, &normed, kv_dim, n_embd, 1)?;
            let v = backend.matmul(&layer.wv, &normed, kv_dim, n_embd, 1)?;
            let (q, k) = backend.rope(
                &q,
                &k,
                cfg.head_dim,
                pos,
                cfg.n_heads,
                cfg.n_kv_heads,
                cfg.rope_theta,
            )?;

            cache.update(layer_idx, &k, &v, pos);
            let attn = self.attend(cache, layer_idx, &q, pos, backend);
            let attn_proj = backend.matmul(&layer.wo, &attn, n_embd, q_dim, 1)?;
            hidden = backend.add(&hidden, &attn_proj)?;

            // SwiGLU: down(silu(gate(x)) * up(x))
            let ffn_in = backend.rms_norm(&hidden, &layer.ffn_norm, cfg.norm_eps, n_embd)?;
            let gate = backend.matmul(&layer.ffn_gate, &ffn_in, cfg.n_ff, n_embd, 1)?;
            let up = backend.matmul(&layer.ffn_up, &ffn_in, cfg.n_ff, n_embd, 1)?;
            let gate_up = backend.mul(&backend.silu(&gate)?, &up)?;
            let ffn_out = backend.matmul(&layer.ffn_down, &gate_up, n_embd, cfg.n_ff, 1)?;
            hidden = backend.add(&hidden, &ffn_out)?;
        }

        if !want_logits {
            return Ok(None);
        }
        let normed = backend.rms_norm(&hidden, &self.weights.output_norm, cfg.norm_eps, n_embd)?;
        let logits = backend.matmul(&self.weights.output, &normed, cfg.n_vocab, n_embd, 1)?;
        Ok(Some(logits))
    }
}
