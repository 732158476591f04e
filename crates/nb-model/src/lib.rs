//! `nb-model` - the evaluation library behind native-bridge.
//!
//! Exposes the contract the bridge core calls into: load a GGUF model,
//! create an evaluation context, tokenize, decode a batch, read logits and
//! detokenize.

pub mod architecture;
pub mod batch;
pub mod context;
pub mod error;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
pub mod gguf;
pub mod llama;
pub mod model;
pub mod tokenizer;

pub use architecture::ModelArchitecture;
pub use batch::{Batch, BatchEntry};
pub use context::{ContextParams, EvalContext};
pub use error::{EvalError, ModelError, Result};
pub use model::{LoadParams, Model, ModelMeta};
pub use tokenizer::{BpeTokenizer, TokenType, TokenizerKind, Vocab};
