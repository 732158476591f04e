use thiserror::Error;

/// Failures while reading a model container.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid GGUF magic: expected 'GGUF', got {0:?}")]
    InvalidMagic([u8; 4]),
    #[error("unsupported GGUF version: {0}")]
    UnsupportedVersion(u32),
    #[error("missing metadata key: {0}")]
    MissingKey(String),
    #[error("type mismatch for key '{key}': expected {expected}, got {got}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        got: &'static str,
    },
    #[error("unsupported GGUF type ID: {0}")]
    UnsupportedGgufType(u32),
    #[error("tensor not found: {0}")]
    TensorNotFound(String),
    #[error("tensor '{name}' has {got} elements, expected {expected}")]
    TensorShape {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("tensor '{name}' lies outside the file ({end} > {len})")]
    TensorOutOfBounds { name: String, end: usize, len: usize },
    #[error("unsupported architecture: {0}")]
    UnsupportedArchitecture(String),
    #[error("tokenizer error: {0}")]
    TokenizerError(String),
    #[error("compute error: {0}")]
    Compute(#[from] nb_compute::ComputeError),
    #[error("malformed model file: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;

/// Failures while creating a context or evaluating a batch.
#[derive(Error, Debug)]
pub enum EvalError {
    #[error("batch is empty")]
    EmptyBatch,
    #[error("batch of {len} tokens exceeds batch capacity {capacity}")]
    BatchTooLarge { len: usize, capacity: usize },
    #[error("sequence slot {seq} out of range (context has {n_seq_max})")]
    InvalidSequence { seq: usize, n_seq_max: usize },
    #[error("token id {token} exceeds vocabulary size {n_vocab}")]
    InvalidToken { token: u32, n_vocab: usize },
    #[error("sequence {seq}: expected position {expected}, got {got}")]
    PositionOutOfOrder {
        seq: usize,
        expected: usize,
        got: usize,
    },
    #[error("context window exhausted: position {pos} does not fit in {n_ctx} tokens")]
    ContextExhausted { pos: usize, n_ctx: usize },
    #[error("failed to allocate {bytes} bytes of KV cache")]
    ContextAllocation { bytes: usize },
    #[error("invalid context parameters: {0}")]
    InvalidParams(String),
    #[error("compute error: {0}")]
    Compute(#[from] nb_compute::ComputeError),
}
