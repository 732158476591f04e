use std::collections::HashMap;

use crate::error::{ModelError, Result};
use crate::gguf::metadata::GgufMetadata;
use super::vocab::{parse_byte_token, TokenType, TokenizerKind, Vocab, SPM_SPACE};

/// A piece of text during encoding. Byte-fallback and unknown symbols never
/// take part in merges.
#[derive(Debug)]
struct Symbol {
    text: String,
    id: Option<u32>,
    mergeable: bool,
}

/// Tokenizer loaded from GGUF metadata.
///
/// With `tokenizer.ggml.merges` present, adjacent pieces are merged by rank
/// (lowest first). Without merges, the SentencePiece rule applies: merge the
/// adjacent pair whose concatenation is in the vocabulary with the highest
/// score, leftmost on ties.
#[derive(Debug)]
pub struct BpeTokenizer {
    pub vocab: Vocab,
    /// Map from merge pair to priority rank (lower rank = higher priority).
    merge_ranks: HashMap<(String, String), usize>,
}

impl BpeTokenizer {
    pub fn from_gguf(metadata: &GgufMetadata) -> Result<BpeTokenizer> {
        let vocab = Vocab::from_gguf(metadata)?;

        let merge_strings = metadata
            .optional("tokenizer.ggml.merges", GgufMetadata::get_string_array)?
            .unwrap_or_default();

        let mut merge_ranks = HashMap::with_capacity(merge_strings.len());
        for (rank, entry) in merge_strings.iter().enumerate() {
            let (left, right) = entry.split_once(' ').ok_or_else(|| {
                ModelError::TokenizerError(format!("invalid merge entry: {:?}", entry))
            })?;
            merge_ranks
                .entry((left.to_string(), right.to_string()))
                .or_insert(rank);
        }

        Ok(BpeTokenizer { vocab, merge_ranks })
    }

    /// Encode `text` into token ids.
    ///
    /// Empty text yields an empty sequence. With `add_special`, BOS is
    /// prepended when the vocabulary asks for it. EOS is never appended.
    pub fn encode(&self, text: &str, add_special: bool) -> Vec<u32> {
        if text.is_empty() {
            return Vec::new();
        }

        let normalized = match self.vocab.kind {
            TokenizerKind::Spm => {
                let escaped = text.replace(' ', SPM_SPACE);
                if self.vocab.add_space_prefix {
                    format!("{}{}", SPM_SPACE, escaped)
                } else {
                    escaped
                }
            }
            TokenizerKind::Bpe => text.to_string(),
        };

        let mut symbols = self.split_symbols(&normalized);
        while let Some(i) = self.best_merge(&symbols) {
            let right = symbols.remove(i + 1);
            let left = &mut symbols[i];
            left.text.push_str(&right.text);
            left.id = self.vocab.token_to_id.get(&left.text).copied();
        }

        let mut ids = Vec::with_capacity(symbols.len() + 1);
        if add_special && self.vocab.add_bos {
            ids.push(self.vocab.bos_id);
        }
        ids.extend(symbols.iter().filter_map(|s| s.id));
        ids
    }

    /// One symbol per character; characters missing from the vocabulary fall
    /// back to `<0xHH>` byte tokens, then to the unknown token.
    fn split_symbols(&self, text: &str) -> Vec<Symbol> {
        let mut symbols = Vec::with_capacity(text.len());
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            let s = ch.encode_utf8(&mut buf);
            if let Some(&id) = self.vocab.token_to_id.get(&*s) {
                symbols.push(Symbol {
                    text: s.to_string(),
                    id: Some(id),
                    mergeable: true,
                });
                continue;
            }

            let byte_ids: Option<Vec<u32>> = s
                .bytes()
                .map(|b| self.vocab.token_to_id.get(&format!("<0x{:02X}>", b)).copied())
                .collect();
            match byte_ids {
                Some(ids) => symbols.extend(ids.into_iter().map(|id| Symbol {
                    text: String::new(),
                    id: Some(id),
                    mergeable: false,
                })),
                None => {
                    tracing::debug!(?ch, "character not in vocabulary");
                    symbols.push(Symbol {
                        text: String::new(),
                        id: self.vocab.unk_id,
                        mergeable: false,
                    });
                }
            }
        }
        symbols
    }

    /// Index of the left symbol of the next pair to merge.
    fn best_merge(&self, symbols: &[Symbol]) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (i, pair) in symbols.windows(2).enumerate() {
            let (left, right) = (&pair[0], &pair[1]);
            if !left.mergeable || !right.mergeable {
                continue;
            }
            let merged = format!("{}{}", left.text, right.text);
            let Some(&id) = self.vocab.token_to_id.get(&merged) else {
                continue;
            };

            // Higher priority is a larger value in both modes.
            let priority = if self.merge_ranks.is_empty() {
                self.vocab.scores[id as usize]
            } else {
                match self.merge_ranks.get(&(left.text.clone(), right.text.clone())) {
                    Some(&rank) => -(rank as f32),
                    None => continue,
                }
            };
            if best.map_or(true, |(_, p)| priority > p) {
                best = Some((i, priority));
            }
        }
        best.map(|(i, _)| i)
    }

    /// Raw bytes a token contributes to the output.
    ///
    /// Control, unknown and unused tokens contribute nothing; byte tokens
    /// contribute one raw byte, which may be part of a multi-byte character.
    pub fn token_to_piece(&self, id: u32) -> Vec<u8> {
        let Some(text) = self.vocab.tokens.get(id as usize) else {
            return Vec::new();
        };
        match self.vocab.token_type(id) {
            Some(TokenType::Control | TokenType::Unknown | TokenType::Unused) => Vec::new(),
            Some(TokenType::Byte) => parse_byte_token(text).map(|b| vec![b]).unwrap_or_default(),
            _ => match self.vocab.kind {
                TokenizerKind::Spm => text.replace(SPM_SPACE, " ").into_bytes(),
                TokenizerKind::Bpe => text.as_bytes().to_vec(),
            },
        }
    }

    /// Decode a sequence of ids, replacing invalid UTF-8 with U+FFFD.
    ///
    /// Drops the leading space that `encode` adds for SentencePiece
    /// vocabularies, so encode-then-decode returns the original text.
    pub fn decode(&self, tokens: &[u32]) -> String {
        let mut bytes: Vec<u8> = tokens.iter().flat_map(|&id| self.token_to_piece(id)).collect();
        if self.strips_space_prefix() && bytes.first() == Some(&b' ') {
            bytes.remove(0);
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Whether full-text decoding removes one leading space.
    pub fn strips_space_prefix(&self) -> bool {
        self.vocab.kind == TokenizerKind::Spm && self.vocab.add_space_prefix
    }

    pub fn is_eog(&self, id: u32) -> bool {
        self.vocab.is_eog(id)
    }

    pub fn bos_id(&self) -> u32 {
        self.vocab.bos_id
    }

    pub fn eos_id(&self) -> u32 {
        self.vocab.eos_id
    }

    pub fn n_vocab(&self) -> usize {
        self.vocab.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gguf::GgufMetadataValue as V;

    fn strings(items: &[&str]) -> V {
        V::Array(items.iter().map(|s| V::String(s.to_string())).collect())
    }

    fn spm() -> BpeTokenizer {
        let tokens = [
            "<unk>", "<s>", "</s>", "▁", "h", "i", "e", "▁h", "▁hi", "<0xC3>", "<0xA9>", "<0x0A>",
        ];
        let scores: Vec<V> = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, -2.0, -1.0, 0.0, 0.0, 0.0]
            .into_iter()
            .map(V::F32)
            .collect();
        let mut md = GgufMetadata::default();
        md.entries.insert("tokenizer.ggml.model".into(), V::String("llama".into()));
        md.entries.insert("tokenizer.ggml.tokens".into(), strings(&tokens));
        md.entries.insert("tokenizer.ggml.scores".into(), V::Array(scores));
        md.entries.insert("tokenizer.ggml.bos_token_id".into(), V::U32(1));
        md.entries.insert("tokenizer.ggml.eos_token_id".into(), V::U32(2));
        md.entries.insert("tokenizer.ggml.unknown_token_id".into(), V::U32(0));
        BpeTokenizer::from_gguf(&md).unwrap()
    }

    fn ranked() -> BpeTokenizer {
        let mut md = GgufMetadata::default();
        md.entries.insert("tokenizer.ggml.model".into(), V::String("gpt2".into()));
        md.entries.insert(
            "tokenizer.ggml.tokens".into(),
            strings(&["<eos>", "a", "b", "c", "ab", "bc", "abc"]),
        );
        md.entries.insert("tokenizer.ggml.merges".into(), strings(&["b c", "a b", "a bc"]));
        md.entries.insert("tokenizer.ggml.bos_token_id".into(), V::U32(0));
        md.entries.insert("tokenizer.ggml.eos_token_id".into(), V::U32(0));
        md.entries.insert("tokenizer.ggml.add_bos_token".into(), V::Bool(false));
        BpeTokenizer::from_gguf(&md).unwrap()
    }

    #[test]
    fn test_empty_text_has_no_bos() {
        assert!(spm().encode("", true).is_empty());
    }

    #[test]
    fn test_spm_score_merges_and_bos() {
        let tok = spm();
        // "▁hi": ▁+h scores -2, then ▁h+i scores -1.
        assert_eq!(tok.encode("hi", true), vec![1, 8]);
        assert_eq!(tok.encode("hi", false), vec![8]);
        assert_eq!(tok.encode("hi hi", false), vec![8, 8]);
    }

    #[test]
    fn test_byte_fallback_and_unknown() {
        let tok = spm();
        // 'é' is C3 A9; 'z' has neither a piece nor byte tokens.
        assert_eq!(tok.encode("é\nz", false), vec![3, 9, 10, 11, 0]);
    }

    #[test]
    fn test_ranked_merges() {
        let tok = ranked();
        // "b c" outranks "a b", so abc -> a + bc -> abc.
        assert_eq!(tok.encode("abc", true), vec![6]);
        assert_eq!(tok.encode("ab", true), vec![4]);
        assert_eq!(tok.encode("cab", true), vec![3, 4]);
    }

    #[test]
    fn test_pieces() {
        let tok = spm();
        assert_eq!(tok.token_to_piece(1), b"");
        assert_eq!(tok.token_to_piece(2), b"");
        assert_eq!(tok.token_to_piece(0), b"");
        assert_eq!(tok.token_to_piece(8), b" hi");
        assert_eq!(tok.token_to_piece(9), vec![0xC3]);
        assert_eq!(tok.token_to_piece(999), b"");
    }

    #[test]
    fn test_decode_round_trip() {
        let tok = spm();
        let ids = tok.encode("hi é", true);
        assert_eq!(tok.decode(&ids), "hi é");
    }

    #[test]
    fn test_invalid_merge_entry() {
        let mut md = GgufMetadata::default();
        md.entries.insert("tokenizer.ggml.tokens".into(), strings(&["a"]));
        md.entries.insert("tokenizer.ggml.merges".into(), strings(&["nospace"]));
        md.entries.insert("tokenizer.ggml.bos_token_id".into(), V::U32(0));
        md.entries.insert("tokenizer.ggml.eos_token_id".into(), V::U32(0));
        assert!(matches!(BpeTokenizer::from_gguf(&md), Err(ModelError::TokenizerError(_))));
    }
}
