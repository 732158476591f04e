use encoding_rs::{CoderResult, Decoder, UTF_8};
use nb_model::{BpeTokenizer, Model};

/// Prompt encoding and token detokenization for the loaded model.
#[derive(Debug, Clone, Copy)]
pub struct TokenizerAdapter<'m> {
    tokenizer: &'m BpeTokenizer,
}

impl<'m> TokenizerAdapter<'m> {
    pub fn new(model: &'m Model) -> Self {
        TokenizerAdapter {
            tokenizer: model.tokenizer(),
        }
    }

    /// Tokens for `text`, with BOS when the model asks for it. Never appends
    /// EOS; empty text yields no tokens.
    pub fn encode(&self, text: &str) -> Vec<u32> {
        self.tokenizer.encode(text, true)
    }

    /// Raw bytes of one token. Control tokens produce nothing; a byte token
    /// may carry part of a multi-byte character.
    pub fn piece(&self, token: u32) -> Vec<u8> {
        self.tokenizer.token_to_piece(token)
    }

    pub fn is_eog(&self, token: u32) -> bool {
        self.tokenizer.is_eog(token)
    }

    /// Concatenate the pieces of `tokens` into text, dropping the space
    /// prefix `encode` adds for SentencePiece vocabularies.
    pub fn detokenize(&self, tokens: &[u32]) -> String {
        let mut decoder = PieceDecoder::new();
        for &token in tokens {
            decoder.push(&self.piece(token));
        }
        let text = decoder.finish();
        match text.strip_prefix(' ') {
            Some(rest) if self.tokenizer.strips_space_prefix() => rest.to_string(),
            _ => text,
        }
    }
}

/// Reassembles token pieces into text.
///
/// Bytes go through an incremental UTF-8 decoder, so a character split across
/// tokens comes out whole, and an incomplete tail becomes U+FFFD on `finish`.
pub struct PieceDecoder {
    decoder: Decoder,
    text: String,
}

impl Default for PieceDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PieceDecoder {
    pub fn new() -> Self {
        PieceDecoder {
            decoder: UTF_8.new_decoder_without_bom_handling(),
            text: String::new(),
        }
    }

    /// Feed bytes; returns the text they completed (possibly empty).
    pub fn push(&mut self, bytes: &[u8]) -> &str {
        let start = self.text.len();
        self.decode(bytes, false);
        &self.text[start..]
    }

    /// Flush pending bytes; returns the text that produced.
    pub fn flush(&mut self) -> &str {
        let start = self.text.len();
        self.decode(&[], true);
        &self.text[start..]
    }

    /// All text decoded so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Flush and take the text.
    pub fn finish(mut self) -> String {
        self.flush();
        self.text
    }

    fn decode(&mut self, mut bytes: &[u8], last: bool) {
        loop {
            let needed = self
                .decoder
                .max_utf8_buffer_length(bytes.len())
                .unwrap_or(bytes.len() * 3 + 3);
            self.text.reserve(needed);
            let (result, read, _replaced) =
                self.decoder.decode_to_string(bytes, &mut self.text, last);
            bytes = &bytes[read..];
            match result {
                CoderResult::InputEmpty => break,
                // Only reachable if the reserve above fell short.
                CoderResult::OutputFull => continue,
            }
        }
        debug_assert!(bytes.is_empty());
    }
}
