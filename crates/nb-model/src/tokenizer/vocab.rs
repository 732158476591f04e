use std::collections::HashMap;

use crate::error::{ModelError, Result};
use crate::gguf::metadata::GgufMetadata;

/// SentencePiece marks spaces with U+2581.
pub const SPM_SPACE: &str = "\u{2581}";

/// How token text maps back to bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizerKind {
    /// SentencePiece-style (`tokenizer.ggml.model = "llama"`): spaces are `▁`.
    Spm,
    /// Plain byte-level vocabulary: token text is emitted as-is.
    Bpe,
}

/// GGUF `tokenizer.ggml.token_type` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Normal,
    Unknown,
    Control,
    UserDefined,
    Unused,
    Byte,
}

impl TokenType {
    fn from_gguf(id: i32) -> TokenType {
        match id {
            2 => TokenType::Unknown,
            3 => TokenType::Control,
            4 => TokenType::UserDefined,
            5 => TokenType::Unused,
            6 => TokenType::Byte,
            _ => TokenType::Normal,
        }
    }
}

/// Parse a byte token of the form `<0xHH>`.
pub fn parse_byte_token(text: &str) -> Option<u8> {
    let hex = text.strip_prefix("<0x")?.strip_suffix('>')?;
    if hex.len() != 2 {
        return None;
    }
    u8::from_str_radix(hex, 16).ok()
}

/// Token vocabulary loaded from GGUF metadata.
#[derive(Debug, Clone)]
pub struct Vocab {
    /// Token strings, indexed by token id.
    pub tokens: Vec<String>,
    /// Merge scores, indexed by token id (zeros when the file has none).
    pub scores: Vec<f32>,
    pub token_types: Vec<TokenType>,
    pub token_to_id: HashMap<String, u32>,
    pub bos_id: u32,
    pub eos_id: u32,
    /// End-of-turn token, for chat models that have one.
    pub eot_id: Option<u32>,
    pub unk_id: Option<u32>,
    /// Whether the model expects BOS in front of every prompt.
    pub add_bos: bool,
    /// SentencePiece only: prepend `▁` to the text before encoding.
    pub add_space_prefix: bool,
    pub kind: TokenizerKind,
}

impl Vocab {
    /// Build a vocabulary from GGUF metadata.
    ///
    /// Required keys: `tokenizer.ggml.tokens`, `tokenizer.ggml.bos_token_id`,
    /// `tokenizer.ggml.eos_token_id`. Optional: `scores`, `token_type`,
    /// `eot_token_id`, `unknown_token_id`, `add_bos_token`,
    /// `add_space_prefix`, `model`.
    pub fn from_gguf(metadata: &GgufMetadata) -> Result<Vocab> {
        let tokens = metadata.get_string_array("tokenizer.ggml.tokens")?;
        if tokens.is_empty() {
            return Err(ModelError::TokenizerError("empty vocabulary".to_string()));
        }

        let scores = metadata.optional("tokenizer.ggml.scores", GgufMetadata::get_f32_array)?;
        let scores = match scores {
            Some(s) if s.len() != tokens.len() => {
                return Err(ModelError::TokenizerError(format!(
                    "tokens length ({}) does not match scores length ({})",
                    tokens.len(),
                    s.len()
                )))
            }
            Some(s) => s,
            None => vec![0.0; tokens.len()],
        };

        let bos_id = metadata.get_u32("tokenizer.ggml.bos_token_id")?;
        let eos_id = metadata.get_u32("tokenizer.ggml.eos_token_id")?;
        let eot_id = metadata.optional("tokenizer.ggml.eot_token_id", GgufMetadata::get_u32)?;
        let unk_id = metadata.optional("tokenizer.ggml.unknown_token_id", GgufMetadata::get_u32)?;
        let special = [
            ("bos", Some(bos_id)),
            ("eos", Some(eos_id)),
            ("eot", eot_id),
            ("unk", unk_id),
        ];
        for (what, id) in special {
            if let Some(id) = id {
                if id as usize >= tokens.len() {
                    return Err(ModelError::TokenizerError(format!(
                        "{} token id {} outside vocabulary of {}",
                        what,
                        id,
                        tokens.len()
                    )));
                }
            }
        }

        let add_bos = metadata
            .optional("tokenizer.ggml.add_bos_token", GgufMetadata::get_bool)?
            .unwrap_or(true);
        let add_space_prefix = metadata
            .optional("tokenizer.ggml.add_space_prefix", GgufMetadata::get_bool)?
            .unwrap_or(true);
        let kind = match metadata.get_string("tokenizer.ggml.model") {
            Ok("llama") => TokenizerKind::Spm,
            _ => TokenizerKind::Bpe,
        };

        let token_types =
            metadata.optional("tokenizer.ggml.token_type", GgufMetadata::get_i32_array)?;
        let token_types = match token_types {
            Some(types) if types.len() == tokens.len() => {
                types.into_iter().map(TokenType::from_gguf).collect()
            }
            Some(types) => {
                return Err(ModelError::TokenizerError(format!(
                    "tokens length ({}) does not match token_type length ({})",
                    tokens.len(),
                    types.len()
                )))
            }
            None => infer_token_types(&tokens, [Some(bos_id), Some(eos_id), eot_id], unk_id),
        };

        let token_to_id = tokens
            .iter()
            .enumerate()
            .map(|(id, tok)| (tok.clone(), id as u32))
            .collect();

        Ok(Vocab {
            tokens,
            scores,
            token_types,
            token_to_id,
            bos_id,
            eos_id,
            eot_id,
            unk_id,
            add_bos,
            add_space_prefix,
            kind,
        })
    }

    /// Number of tokens in the vocabulary.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn token_type(&self, id: u32) -> Option<TokenType> {
        self.token_types.get(id as usize).copied()
    }

    /// End of generation: EOS, or EOT when the model defines one.
    pub fn is_eog(&self, id: u32) -> bool {
        id == self.eos_id || Some(id) == self.eot_id
    }
}

/// Without explicit types: `<0xHH>` tokens are bytes, special ids are control.
fn infer_token_types(
    tokens: &[String],
    control: [Option<u32>; 3],
    unk: Option<u32>,
) -> Vec<TokenType> {
    tokens
        .iter()
        .enumerate()
        .map(|(id, tok)| {
            let id = Some(id as u32);
            if control.contains(&id) {
                TokenType::Control
            } else if unk == id {
                TokenType::Unknown
            } else if parse_byte_token(tok).is_some() {
                TokenType::Byte
            } else {
                TokenType::Normal
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gguf::GgufMetadataValue as V;

    fn strings(items: &[&str]) -> V {
        V::Array(items.iter().map(|s| V::String(s.to_string())).collect())
    }

    fn base() -> GgufMetadata {
        let mut md = GgufMetadata::default();
        md.entries.insert(
            "tokenizer.ggml.tokens".into(),
            strings(&["<unk>", "<s>", "</s>", "<0x41>", "a"]),
        );
        md.entries.insert("tokenizer.ggml.bos_token_id".into(), V::U32(1));
        md.entries.insert("tokenizer.ggml.eos_token_id".into(), V::U32(2));
        md
    }

    #[test]
    fn test_defaults_and_inferred_types() {
        let mut md = base();
        md.entries.insert("tokenizer.ggml.unknown_token_id".into(), V::U32(0));
        let vocab = Vocab::from_gguf(&md).unwrap();

        assert_eq!(vocab.len(), 5);
        assert!(vocab.add_bos);
        assert!(vocab.add_space_prefix);
        assert_eq!(vocab.kind, TokenizerKind::Bpe);
        assert_eq!(vocab.scores, vec![0.0; 5]);
        assert_eq!(
            vocab.token_types,
            vec![
                TokenType::Unknown,
                TokenType::Control,
                TokenType::Control,
                TokenType::Byte,
                TokenType::Normal
            ]
        );
        assert_eq!(vocab.token_to_id["a"], 4);
    }

    #[test]
    fn test_eog_includes_eot() {
        let mut md = base();
        md.entries.insert("tokenizer.ggml.eot_token_id".into(), V::U32(4));
        md.entries.insert("tokenizer.ggml.model".into(), V::String("llama".into()));
        let vocab = Vocab::from_gguf(&md).unwrap();

        assert_eq!(vocab.kind, TokenizerKind::Spm);
        assert!(vocab.is_eog(2));
        assert!(vocab.is_eog(4));
        assert!(!vocab.is_eog(1));
    }

    #[test]
    fn test_rejects_out_of_range_special_ids() {
        let mut md = base();
        md.entries.insert("tokenizer.ggml.eos_token_id".into(), V::U32(99));
        assert!(matches!(Vocab::from_gguf(&md), Err(ModelError::TokenizerError(_))));
    }

    #[test]
    fn test_rejects_score_length_mismatch() {
        let mut md = base();
        md.entries.insert("tokenizer.ggml.scores".into(), V::Array(vec![V::F32(0.0)]));
        assert!(Vocab::from_gguf(&md).is_err());
    }

    #[test]
    fn test_parse_byte_token() {
        assert_eq!(parse_byte_token("<0x0A>"), Some(b'\n'));
        assert_eq!(parse_byte_token("<0xff>"), Some(0xFF));
        assert_eq!(parse_byte_token("<0x1>"), None);
        assert_eq!(parse_byte_token("0x41"), None);
    }
}
