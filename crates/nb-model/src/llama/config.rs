use crate::error::{ModelError, Result};
use crate::gguf::metadata::GgufMetadata;

/// Hyperparameters of a llama-family model, parsed from GGUF metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct LlamaConfig {
    /// Value of `general.architecture` (`llama`, `mistral`).
    pub arch: String,
    pub n_vocab: usize,
    /// Embedding dimension / hidden size.
    pub n_embd: usize,
    /// Number of attention heads for queries.
    pub n_heads: usize,
    /// Number of attention heads for keys/values (GQA).
    pub n_kv_heads: usize,
    pub n_layers: usize,
    /// Feed-forward intermediate dimension.
    pub n_ff: usize,
    pub norm_eps: f32,
    /// Context length the model was trained with.
    pub n_ctx_train: usize,
    pub rope_theta: f32,
    pub head_dim: usize,
}

impl LlamaConfig {
    /// Parse hyperparameters from `{arch}.*` metadata keys.
    ///
    /// - `{arch}.embedding_length`, `{arch}.block_count`,
    ///   `{arch}.feed_forward_length`, `{arch}.context_length`
    /// - `{arch}.attention.head_count`, `{arch}.attention.head_count_kv`
    ///   (defaults to head_count)
    /// - `{arch}.attention.layer_norm_rms_epsilon`
    /// - `{arch}.rope.freq_base` (default 10000)
    /// - `{arch}.vocab_size`, or the length of `tokenizer.ggml.tokens`
    pub fn from_gguf(metadata: &GgufMetadata, arch: &str) -> Result<LlamaConfig> {
        let key = |suffix: &str| format!("{}.{}", arch, suffix);

        let n_embd = metadata.get_usize(&key("embedding_length"))?;
        let n_heads = metadata.get_usize(&key("attention.head_count"))?;
        let n_kv_heads = metadata
            .optional(&key("attention.head_count_kv"), GgufMetadata::get_usize)?
            .unwrap_or(n_heads);
        let n_layers = metadata.get_usize(&key("block_count"))?;
        let n_ff = metadata.get_usize(&key("feed_forward_length"))?;
        let norm_eps = metadata.get_f32(&key("attention.layer_norm_rms_epsilon"))?;
        let n_ctx_train = metadata.get_usize(&key("context_length"))?;
        let rope_theta = metadata
            .optional(&key("rope.freq_base"), GgufMetadata::get_f32)?
            .unwrap_or(10000.0);
        let n_vocab = match metadata.optional(&key("vocab_size"), GgufMetadata::get_usize)? {
            Some(n) => n,
            None => metadata.get_string_array("tokenizer.ggml.tokens")?.len(),
        };

        if n_heads == 0 || n_kv_heads == 0 || n_embd % n_heads != 0 || n_heads % n_kv_heads != 0 {
            return Err(ModelError::Malformed(format!(
                "inconsistent attention shape: n_embd={} n_heads={} n_kv_heads={}",
                n_embd, n_heads, n_kv_heads
            )));
        }
        let head_dim = n_embd / n_heads;
        if head_dim % 2 != 0 {
            return Err(ModelError::Malformed(format!(
                "head dimension {} is odd, rotary embedding needs pairs",
                head_dim
            )));
        }
        if n_vocab == 0 || n_ctx_train == 0 {
            return Err(ModelError::Malformed(
                "vocabulary size and context length must be non-zero".to_string(),
            ));
        }
        // Weight element counts are products of these; reject sizes that
        // cannot be addressed before any tensor is read.
        let widest = n_vocab.max(n_ff).max(n_embd);
        if widest.checked_mul(n_embd).is_none() {
            return Err(ModelError::Malformed(format!(
                "weight shape {} x {} is too large",
                widest, n_embd
            )));
        }

        Ok(LlamaConfig {
            arch: arch.to_string(),
            n_vocab,
            n_embd,
            n_heads,
            n_kv_heads,
            n_layers,
            n_ff,
            norm_eps,
            n_ctx_train,
            rope_theta,
            head_dim,
        })
    }

    pub fn kv_dim(&self) -> usize {
        self.n_kv_heads * self.head_dim
    }

    pub fn q_dim(&self) -> usize {
        self.n_heads * self.head_dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gguf::GgufMetadataValue as V;

    fn metadata(arch: &str) -> GgufMetadata {
        let mut md = GgufMetadata::default();
        let mut put = |k: &str, v: V| {
            md.entries.insert(format!("{}.{}", arch, k), v);
        };
        put("embedding_length", V::U32(64));
        put("attention.head_count", V::U32(4));
        put("block_count", V::U32(2));
        put("feed_forward_length", V::U32(128));
        put("attention.layer_norm_rms_epsilon", V::F32(1e-5));
        put("context_length", V::U32(256));
        md.entries.insert(
            "tokenizer.ggml.tokens".into(),
            V::Array(vec![V::String("a".into()), V::String("b".into())]),
        );
        md
    }

    #[test]
    fn test_defaults() {
        let cfg = LlamaConfig::from_gguf(&metadata("mistral"), "mistral").unwrap();
        assert_eq!(cfg.arch, "mistral");
        assert_eq!(cfg.n_kv_heads, 4);
        assert_eq!(cfg.head_dim, 16);
        assert_eq!(cfg.rope_theta, 10000.0);
        assert_eq!(cfg.n_vocab, 2);
        assert_eq!(cfg.n_ctx_train, 256);
        assert_eq!(cfg.kv_dim(), 64);
    }

    #[test]
    fn test_keys_follow_architecture() {
        let md = metadata("llama");
        assert!(matches!(
            LlamaConfig::from_gguf(&md, "mistral"),
            Err(ModelError::MissingKey(k)) if k == "mistral.embedding_length"
        ));
    }

    #[test]
    fn test_rejects_unaddressable_shapes() {
        let mut md = metadata("llama");
        md.entries.insert("llama.vocab_size".into(), V::U64(1 << 60));
        assert!(matches!(LlamaConfig::from_gguf(&md, "llama"), Err(ModelError::Malformed(_))));
    }

    #[test]
    fn test_rejects_bad_head_split() {
        let mut md = metadata("llama");
        md.entries.insert("llama.attention.head_count_kv".into(), V::U32(3));
        assert!(matches!(LlamaConfig::from_gguf(&md, "llama"), Err(ModelError::Malformed(_))));
    }
}
