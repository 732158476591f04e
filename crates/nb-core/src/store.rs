use std::fmt;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};

use nb_model::{LoadParams, Model};
use tracing::info;

use crate::config::ModelParams;
use crate::error::LoadError;

/// Opaque id of a loaded model. Never zero; ids grow per bridge so a stale
/// handle never names a newer model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelHandle(NonZeroU64);

impl ModelHandle {
    pub fn new(id: NonZeroU64) -> Self {
        ModelHandle(id)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model#{}", self.0)
    }
}

/// Descriptive snapshot of the loaded model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub handle: ModelHandle,
    pub path: PathBuf,
    pub name: String,
    pub architecture: String,
    pub n_vocab: usize,
    pub n_ctx_train: usize,
    pub n_embd: usize,
    pub n_layers: usize,
}

impl fmt::Display for ModelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "GGUF Model")?;
        writeln!(f, "Name: {}", self.name)?;
        writeln!(f, "Architecture: {}", self.architecture)?;
        writeln!(f, "Vocabulary size: {}", self.n_vocab)?;
        writeln!(f, "Training context length: {}", self.n_ctx_train)?;
        writeln!(f, "Embedding size: {}", self.n_embd)?;
        write!(f, "Layers: {}", self.n_layers)
    }
}

/// Loaded model weights and tokenizer, identified by a handle.
#[derive(Debug)]
pub struct ModelStore {
    handle: ModelHandle,
    path: PathBuf,
    model: Model,
}

impl ModelStore {
    /// Load a GGUF model for CPU evaluation.
    pub fn load(
        path: &Path,
        params: &ModelParams,
        handle: ModelHandle,
    ) -> Result<ModelStore, LoadError> {
        if params.use_mlock {
            return Err(LoadError::Unsupported("use_mlock"));
        }

        let load_params = LoadParams {
            use_mmap: params.use_mmap,
        };
        let model = Model::load(path, &load_params).map_err(|source| LoadError::Model {
            path: path.to_path_buf(),
            source,
        })?;
        info!(%handle, path = %path.display(), "model acquired");

        Ok(ModelStore {
            handle,
            path: path.to_path_buf(),
            model,
        })
    }

    pub fn handle(&self) -> ModelHandle {
        self.handle
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn info(&self) -> ModelInfo {
        let meta = self.model.meta();
        ModelInfo {
            handle: self.handle,
            path: self.path.clone(),
            name: meta.name.clone(),
            architecture: meta.architecture.clone(),
            n_vocab: meta.n_vocab,
            n_ctx_train: meta.n_ctx_train,
            n_embd: meta.n_embd,
            n_layers: meta.n_layers,
        }
    }

    /// Release the weights.
    pub fn unload(self) {
        info!(handle = %self.handle, "model released");
    }
}
