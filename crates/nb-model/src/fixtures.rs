//! Tiny deterministic llama models for tests.
//!
//! The model has one layer with zero attention and FFN weights, one-hot token
//! embeddings (`n_embd == n_vocab`) and an LM head that maps each token to a
//! chosen successor. The greedy next token is therefore a pure function of the
//! current token, which makes generated text exact and known in advance.
//! Tokens without a configured successor lead to EOS.

use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;
use crate::gguf::{GgufMetadataValue as V, GgufWriter};
use crate::tokenizer::vocab::SPM_SPACE;

const UNK: u32 = 0;
const BOS: u32 = 1;
const EOS: u32 = 2;
const N_FF: u64 = 2;

/// Builder for a tiny SentencePiece-vocabulary llama GGUF file.
///
/// Vocabulary: `<unk>`, `<s>`, `</s>`, `▁`, printable ASCII, byte tokens for
/// `\n` and `é`, padded to an even size.
#[derive(Debug, Clone)]
pub struct TinyLlama {
    tokens: Vec<String>,
    token_types: Vec<i32>,
    next: HashMap<u32, u32>,
    architecture: String,
    name: Option<String>,
    n_ctx_train: u32,
    add_bos: bool,
}

impl Default for TinyLlama {
    fn default() -> Self {
        Self::new()
    }
}

impl TinyLlama {
    pub fn new() -> Self {
        let mut tokens: Vec<String> = vec!["<unk>".into(), "<s>".into(), "</s>".into()];
        let mut token_types = vec![2, 3, 3];

        tokens.push(SPM_SPACE.to_string());
        token_types.push(1);
        for c in '!'..='~' {
            tokens.push(c.to_string());
            token_types.push(1);
        }
        for byte in [0x0Au8, 0xC3, 0xA9] {
            tokens.push(format!("<0x{:02X}>", byte));
            token_types.push(6);
        }
        let mut unused = 0;
        while tokens.len() % 2 != 0 {
            tokens.push(format!("<unused{}>", unused));
            token_types.push(5);
            unused += 1;
        }

        TinyLlama {
            tokens,
            token_types,
            next: HashMap::new(),
            architecture: "llama".to_string(),
            name: None,
            n_ctx_train: 512,
            add_bos: true,
        }
    }

    /// After `from`, the model predicts `to`. Pieces use `▁` for spaces.
    pub fn with_transition(mut self, from: &str, to: &str) -> Self {
        let (from, to) = (self.token_id(from), self.token_id(to));
        self.next.insert(from, to);
        self
    }

    /// Chain transitions through consecutive pieces.
    pub fn with_sequence(mut self, pieces: &[&str]) -> Self {
        for pair in pieces.windows(2) {
            self = self.with_transition(pair[0], pair[1]);
        }
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_architecture(mut self, architecture: &str) -> Self {
        self.architecture = architecture.to_string();
        self
    }

    pub fn with_context_length(mut self, n_ctx_train: u32) -> Self {
        self.n_ctx_train = n_ctx_train;
        self
    }

    pub fn with_add_bos(mut self, add_bos: bool) -> Self {
        self.add_bos = add_bos;
        self
    }

    /// Id of a vocabulary piece. Panics when the piece is not in the vocabulary.
    pub fn token_id(&self, piece: &str) -> u32 {
        match self.tokens.iter().position(|t| t == piece) {
            Some(id) => id as u32,
            None => panic!("piece {:?} is not in the fixture vocabulary", piece),
        }
    }

    pub fn n_vocab(&self) -> usize {
        self.tokens.len()
    }

    pub fn bos_id(&self) -> u32 {
        BOS
    }

    pub fn eos_id(&self) -> u32 {
        EOS
    }

    fn successor(&self, token: u32) -> u32 {
        self.next.get(&token).copied().unwrap_or(EOS)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        self.writer().write_file(path)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.writer().write_to(&mut out)?;
        Ok(out)
    }

    fn writer(&self) -> GgufWriter {
        let v = self.tokens.len();
        let dim = v as u64;
        let arch = self.architecture.as_str();
        let key = |suffix: &str| format!("{}.{}", arch, suffix);

        let mut w = GgufWriter::new();
        w.add_metadata("general.architecture", V::String(arch.to_string()));
        if let Some(name) = &self.name {
            w.add_metadata("general.name", V::String(name.clone()));
        }
        w.add_metadata(&key("context_length"), V::U32(self.n_ctx_train))
            .add_metadata(&key("embedding_length"), V::U32(v as u32))
            .add_metadata(&key("block_count"), V::U32(1))
            .add_metadata(&key("feed_forward_length"), V::U32(N_FF as u32))
            .add_metadata(&key("attention.head_count"), V::U32(1))
            .add_metadata(&key("attention.head_count_kv"), V::U32(1))
            .add_metadata(&key("attention.layer_norm_rms_epsilon"), V::F32(1e-5))
            .add_metadata(&key("rope.freq_base"), V::F32(10000.0))
            .add_metadata("tokenizer.ggml.model", V::String("llama".into()))
            .add_metadata(
                "tokenizer.ggml.tokens",
                V::Array(self.tokens.iter().cloned().map(V::String).collect()),
            )
            .add_metadata("tokenizer.ggml.scores", V::Array(vec![V::F32(0.0); v]))
            .add_metadata(
                "tokenizer.ggml.token_type",
                V::Array(self.token_types.iter().copied().map(V::I32).collect()),
            )
            .add_metadata("tokenizer.ggml.bos_token_id", V::U32(BOS))
            .add_metadata("tokenizer.ggml.eos_token_id", V::U32(EOS))
            .add_metadata("tokenizer.ggml.unknown_token_id", V::U32(UNK))
            .add_metadata("tokenizer.ggml.add_bos_token", V::Bool(self.add_bos));

        let mut embd = vec![0.0f32; v * v];
        let mut output = vec![0.0f32; v * v];
        for t in 0..v {
            embd[t * v + t] = 1.0;
            output[self.successor(t as u32) as usize * v + t] = 1.0;
        }
        let ones = vec![1.0f32; v];
        let zeros_sq = vec![0.0f32; v * v];
        let zeros_ff = vec![0.0f32; v * N_FF as usize];

        w.add_tensor_f32("token_embd.weight", &[dim, dim], &embd)
            .add_tensor_f32("output_norm.weight", &[dim], &ones)
            .add_tensor_f32("output.weight", &[dim, dim], &output)
            .add_tensor_f32("blk.0.attn_norm.weight", &[dim], &ones)
            .add_tensor_f32("blk.0.attn_q.weight", &[dim, dim], &zeros_sq)
            .add_tensor_f32("blk.0.attn_k.weight", &[dim, dim], &zeros_sq)
            .add_tensor_f32("blk.0.attn_v.weight", &[dim, dim], &zeros_sq)
            .add_tensor_f32("blk.0.attn_output.weight", &[dim, dim], &zeros_sq)
            .add_tensor_f32("blk.0.ffn_norm.weight", &[dim], &ones)
            .add_tensor_f32("blk.0.ffn_gate.weight", &[dim, N_FF], &zeros_ff)
            .add_tensor_f32("blk.0.ffn_up.weight", &[dim, N_FF], &zeros_ff)
            .add_tensor_f32("blk.0.ffn_down.weight", &[N_FF, dim], &zeros_ff);
        w
    }
}
