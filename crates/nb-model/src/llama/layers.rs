use crate::error::{ModelError, Result};
use crate::gguf::reader::GgufFile;
use super::config::LlamaConfig;

/// Weight tensors for a single transformer layer, dequantized to f32.
///
/// Projection matrices are `[out_dim, in_dim]` row-major, as GGUF stores them.
#[derive(Debug)]
pub struct LlamaLayer {
    pub attn_norm: Vec<f32>,
    pub wq: Vec<f32>,
    pub wk: Vec<f32>,
    pub wv: Vec<f32>,
    pub wo: Vec<f32>,
    pub ffn_norm: Vec<f32>,
    pub ffn_gate: Vec<f32>,
    pub ffn_up: Vec<f32>,
    pub ffn_down: Vec<f32>,
}

/// All weight tensors for a llama-family model.
#[derive(Debug)]
pub struct LlamaWeights {
    /// Token embedding matrix, `[n_vocab, n_embd]`.
    pub token_embd: Vec<f32>,
    pub output_norm: Vec<f32>,
    /// LM head, `[n_vocab, n_embd]`.
    pub output: Vec<f32>,
    pub layers: Vec<LlamaLayer>,
}

impl LlamaWeights {
    /// Load every tensor, checking element counts against `config`.
    ///
    /// `output.weight` falls back to the token embeddings when absent (tied
    /// embeddings).
    pub fn from_gguf(gguf: &GgufFile, config: &LlamaConfig) -> Result<LlamaWeights> {
        let n_embd = config.n_embd;
        let q_dim = config.q_dim();
        let kv_dim = config.kv_dim();
        let n_ff = config.n_ff;

        let token_embd = gguf.tensor_f32_sized("token_embd.weight", config.n_vocab * n_embd)?;
        let output_norm = gguf.tensor_f32_sized("output_norm.weight", n_embd)?;
        let output = match gguf.tensor_f32_sized("output.weight", config.n_vocab * n_embd) {
            Ok(w) => w,
            Err(ModelError::TensorNotFound(_)) => token_embd.clone(),
            Err(e) => return Err(e),
        };

        let mut layers = Vec::with_capacity(config.n_layers);
        for i in 0..config.n_layers {
            let load = |name: &str, numel: usize| {
                gguf.tensor_f32_sized(&format!("blk.{}.{}.weight", i, name), numel)
            };
            layers.push(LlamaLayer {
                attn_norm: load("attn_norm", n_embd)?,
                wq: load("attn_q", q_dim * n_embd)?,
                wk: load("attn_k", kv_dim * n_embd)?,
                wv: load("attn_v", kv_dim * n_embd)?,
                wo: load("attn_output", n_embd * q_dim)?,
                ffn_norm: load("ffn_norm", n_embd)?,
                ffn_gate: load("ffn_gate", n_ff * n_embd)?,
                ffn_up: load("ffn_up", n_ff * n_embd)?,
                ffn_down: load("ffn_down", n_embd * n_ff)?,
            });
        }

        Ok(LlamaWeights {
            token_embd,
            output_norm,
            output,
            layers,
        })
    }
}
