use std::path::PathBuf;

use thiserror::Error;

/// Failures while acquiring model weights.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to load model from {path}: {source}")]
    Model {
        path: PathBuf,
        #[source]
        source: nb_model::ModelError,
    },
    #[error("unsupported model option: {0}")]
    Unsupported(&'static str),
}

/// Failures while creating an evaluation session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no model loaded")]
    NotLoaded,
    #[error("failed to allocate evaluation context: {0}")]
    ContextAllocation(#[source] nb_model::EvalError),
    #[error("invalid session configuration: {0}")]
    InvalidConfig(String),
}

/// Failures while evaluating a batch.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error(transparent)]
    Eval(#[from] nb_model::EvalError),
}

impl DecodeError {
    /// The underlying evaluation failure.
    pub fn eval(&self) -> &nb_model::EvalError {
        match self {
            DecodeError::Eval(e) => e,
        }
    }
}

/// Everything a bridge operation can report.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("no model loaded")]
    NotLoaded,
    #[error("prompt produced no tokens")]
    EmptyPrompt,
}

/// Failures while reading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
