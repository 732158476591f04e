use std::fmt;

use nb_model::Batch;
use nb_sampler::{ArgMax, TokenSelector};
use tracing::{debug, warn};

use crate::decoder::BatchDecoder;
use crate::error::BridgeError;
use crate::session::Session;
use crate::store::ModelStore;
use crate::tokenizer::{PieceDecoder, TokenizerAdapter};

/// Sequence slot used for generation.
const SEQ: usize = 0;

/// Why generation stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The model produced an end-of-generation token.
    EndOfSequence,
    /// The token budget was used up.
    MaxTokens,
    /// A decode call failed; the text holds whatever came before it.
    DecodeFailed(String),
}

impl StopReason {
    pub fn is_failure(&self) -> bool {
        matches!(self, StopReason::DecodeFailed(_))
    }

    pub fn failure_message(&self) -> Option<&str> {
        match self {
            StopReason::DecodeFailed(msg) => Some(msg),
            _ => None,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::EndOfSequence => write!(f, "end of sequence"),
            StopReason::MaxTokens => write!(f, "token budget reached"),
            StopReason::DecodeFailed(msg) => write!(f, "decode failed: {}", msg),
        }
    }
}

/// Output of one generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub text: String,
    pub tokens_generated: usize,
    pub prompt_tokens: usize,
    pub stop_reason: StopReason,
}

/// Autoregressive generation over a session.
pub struct GenerationLoop {
    selector: Box<dyn TokenSelector>,
}

impl Default for GenerationLoop {
    fn default() -> Self {
        Self::new(Box::new(ArgMax))
    }
}

impl GenerationLoop {
    pub fn new(selector: Box<dyn TokenSelector>) -> Self {
        GenerationLoop { selector }
    }

    pub fn selector_name(&self) -> &str {
        self.selector.name()
    }

    /// Generate up to `max_tokens` tokens continuing `prompt`.
    ///
    /// The session is reset first, so identical requests produce identical
    /// results. `on_fragment` sees each piece of newly completed text as it is
    /// produced.
    pub fn run(
        &mut self,
        session: &mut Session,
        store: &ModelStore,
        prompt: &str,
        max_tokens: usize,
        mut on_fragment: Option<&mut dyn FnMut(&str)>,
    ) -> Result<GenerationResult, BridgeError> {
        session.reset();
        self.selector.reset();

        let adapter = TokenizerAdapter::new(store.model());
        let tokens = adapter.encode(prompt);
        if tokens.is_empty() {
            return Err(BridgeError::EmptyPrompt);
        }
        let prompt_tokens = tokens.len();
        let finished =
            |text: String, tokens_generated: usize, stop_reason: StopReason| GenerationResult {
                text,
                tokens_generated,
                prompt_tokens,
                stop_reason,
            };

        if max_tokens == 0 {
            return Ok(finished(String::new(), 0, StopReason::MaxTokens));
        }

        let mut logits_index = match self.prefill(session, store, &tokens) {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, prompt_tokens, "prompt evaluation failed");
                return Ok(finished(String::new(), 0, StopReason::DecodeFailed(e.to_string())));
            }
        };

        let mut text = PieceDecoder::new();
        let mut generated = 0;
        let mut stop_reason = StopReason::MaxTokens;
        for step in 0..max_tokens {
            let Some(logits) = BatchDecoder::logits(session, logits_index) else {
                stop_reason = StopReason::DecodeFailed("no logits for the last token".to_string());
                break;
            };
            let Some(token) = self.selector.select(logits) else {
                stop_reason = StopReason::DecodeFailed("no selectable token in logits".to_string());
                break;
            };
            if adapter.is_eog(token) {
                debug!(step, token, "end of generation");
                stop_reason = StopReason::EndOfSequence;
                break;
            }

            self.selector.accept(token);
            generated += 1;
            let fragment = text.push(&adapter.piece(token));
            debug!(step, token, fragment, "token generated");
            if let Some(observer) = on_fragment.as_deref_mut() {
                if !fragment.is_empty() {
                    observer(fragment);
                }
            }

            // The last budgeted token's logits would never be read.
            if step + 1 == max_tokens {
                break;
            }
            let batch = Batch::single(token, prompt_tokens + step, SEQ);
            if let Err(e) = BatchDecoder::decode(session, store, &batch) {
                warn!(error = %e, step, "decode failed, returning partial text");
                stop_reason = StopReason::DecodeFailed(e.to_string());
                break;
            }
            logits_index = 0;
        }

        let tail = text.flush();
        if let Some(observer) = on_fragment.as_deref_mut() {
            if !tail.is_empty() {
                observer(tail);
            }
        }
        Ok(finished(text.finish(), generated, stop_reason))
    }

    /// Evaluate the prompt in batch-capacity chunks. Only the final entry
    /// requests logits; returns its index within the last batch.
    fn prefill(
        &self,
        session: &mut Session,
        store: &ModelStore,
        tokens: &[u32],
    ) -> Result<usize, BridgeError> {
        let n_batch = session.n_batch();
        let n_chunks = tokens.len().div_ceil(n_batch);
        let mut batch = Batch::new(n_batch.min(tokens.len()));
        let mut last_index = 0;

        for (c, chunk) in tokens.chunks(n_batch).enumerate() {
            batch.clear();
            let start = c * n_batch;
            let final_chunk = c + 1 == n_chunks;
            for (j, &token) in chunk.iter().enumerate() {
                batch.add(token, start + j, SEQ, final_chunk && j + 1 == chunk.len());
            }
            BatchDecoder::decode(session, store, &batch)?;
            last_index = chunk.len() - 1;
        }
        debug!(prompt_tokens = tokens.len(), n_chunks, "prompt evaluated");
        Ok(last_index)
    }
}
