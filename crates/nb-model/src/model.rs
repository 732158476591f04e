use std::path::Path;

use tracing::{debug, info};

use crate::architecture::ModelArchitecture;
use crate::error::{ModelError, Result};
use crate::gguf::reader::GgufFile;
use crate::llama::LlamaModel;
use crate::tokenizer::BpeTokenizer;

/// Architectures served by the llama forward pass.
const LLAMA_FAMILY: &[&str] = &["llama", "mistral"];

/// How the container is read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadParams {
    /// Memory-map the file instead of reading it into a buffer.
    pub use_mmap: bool,
}

impl Default for LoadParams {
    fn default() -> Self {
        LoadParams { use_mmap: true }
    }
}

/// Descriptive attributes of a loaded model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMeta {
    /// `general.name`, or the architecture name when absent.
    pub name: String,
    pub architecture: String,
    pub n_vocab: usize,
    pub n_ctx_train: usize,
    pub n_embd: usize,
    pub n_layers: usize,
    pub n_heads: usize,
}

/// Immutable weights plus tokenizer, ready to back evaluation contexts.
#[derive(Debug)]
pub struct Model {
    meta: ModelMeta,
    tokenizer: BpeTokenizer,
    arch: Box<dyn ModelArchitecture>,
}

impl Model {
    /// Load a GGUF model from `path`.
    pub fn load(path: &Path, params: &LoadParams) -> Result<Model> {
        debug!(path = %path.display(), use_mmap = params.use_mmap, "opening GGUF");
        let gguf = GgufFile::open_with(path, params.use_mmap)?;
        let model = Model::from_gguf(&gguf)?;
        info!(
            name = %model.meta.name,
            arch = %model.meta.architecture,
            n_vocab = model.meta.n_vocab,
            n_layers = model.meta.n_layers,
            "model loaded"
        );
        Ok(model)
    }

    /// Build a model from an already parsed container.
    pub fn from_gguf(gguf: &GgufFile) -> Result<Model> {
        let architecture = gguf.metadata.get_string("general.architecture")?.to_string();
        let arch: Box<dyn ModelArchitecture> = if LLAMA_FAMILY.contains(&architecture.as_str()) {
            Box::new(LlamaModel::from_gguf(gguf, &architecture)?)
        } else {
            return Err(ModelError::UnsupportedArchitecture(architecture));
        };

        let tokenizer = BpeTokenizer::from_gguf(&gguf.metadata)?;
        if tokenizer.n_vocab() != arch.n_vocab() {
            return Err(ModelError::Malformed(format!(
                "tokenizer has {} tokens but the model expects {}",
                tokenizer.n_vocab(),
                arch.n_vocab()
            )));
        }

        let name = gguf
            .metadata
            .optional("general.name", |md, k| md.get_string(k).map(str::to_string))?
            .unwrap_or_else(|| architecture.clone());

        let meta = ModelMeta {
            name,
            architecture,
            n_vocab: arch.n_vocab(),
            n_ctx_train: arch.n_ctx_train(),
            n_embd: arch.n_embd(),
            n_layers: arch.n_layers(),
            n_heads: arch.n_heads(),
        };

        Ok(Model {
            meta,
            tokenizer,
            arch,
        })
    }

    pub fn meta(&self) -> &ModelMeta {
        &self.meta
    }

    pub fn tokenizer(&self) -> &BpeTokenizer {
        &self.tokenizer
    }

    pub fn architecture(&self) -> &dyn ModelArchitecture {
        self.arch.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TinyLlama;

    #[test]
    fn test_load_fixture_both_modes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.gguf");
        let tiny = TinyLlama::new().with_name("tiny-test");
        tiny.write_to(&path).unwrap();

        for use_mmap in [true, false] {
            let model = Model::load(&path, &LoadParams { use_mmap }).unwrap();
            let meta = model.meta();
            assert_eq!(meta.name, "tiny-test");
            assert_eq!(meta.architecture, "llama");
            assert_eq!(meta.n_vocab, tiny.n_vocab());
            assert_eq!(meta.n_embd, tiny.n_vocab());
            assert_eq!(meta.n_layers, 1);
            assert_eq!(meta.n_heads, 1);
            assert_eq!(model.tokenizer().n_vocab(), tiny.n_vocab());
        }
    }

    #[test]
    fn test_unsupported_architecture() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gpt.gguf");
        TinyLlama::new().with_architecture("gpt2").write_to(&path).unwrap();

        assert!(matches!(
            Model::load(&path, &LoadParams::default()),
            Err(ModelError::UnsupportedArchitecture(a)) if a == "gpt2"
        ));
    }

    #[test]
    fn test_mistral_is_llama_family() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mistral.gguf");
        TinyLlama::new().with_architecture("mistral").write_to(&path).unwrap();

        let model = Model::load(&path, &LoadParams::default()).unwrap();
        assert_eq!(model.meta().architecture, "mistral");
        assert_eq!(model.meta().name, "mistral");
    }

    #[test]
    fn test_not_gguf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.bin");
        std::fs::write(&path, b"definitely not a model").unwrap();
        assert!(matches!(
            Model::load(&path, &LoadParams::default()),
            Err(ModelError::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = Model::load(Path::new("/nonexistent/model.gguf"), &LoadParams::default());
        assert!(matches!(err, Err(ModelError::Io(_))));
    }
}
