use nb_compute::CpuBackend;

use crate::batch::Batch;
use crate::error::EvalError;
use crate::llama::KvCache;
use crate::model::Model;

/// Sizing of an evaluation context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextParams {
    /// Positions per sequence slot.
    pub n_ctx: usize,
    /// Maximum entries per `decode` call.
    pub n_batch: usize,
    pub n_threads: usize,
    /// Number of sequence slots.
    pub n_seq_max: usize,
}

impl Default for ContextParams {
    fn default() -> Self {
        ContextParams {
            n_ctx: 2048,
            n_batch: 512,
            n_threads: 1,
            n_seq_max: 1,
        }
    }
}

/// Mutable evaluation state for one model: a KV cache per sequence slot and
/// the logits produced by the last `decode`.
///
/// The context does not borrow the model; every call that evaluates takes the
/// `Model` it was created for.
#[derive(Debug)]
pub struct EvalContext {
    params: ContextParams,
    backend: CpuBackend,
    caches: Vec<KvCache>,
    /// One slot per entry of the last batch; `Some` where logits were requested.
    outputs: Vec<Option<Vec<f32>>>,
}

impl EvalContext {
    pub fn new(model: &Model, params: ContextParams) -> Result<EvalContext, EvalError> {
        for (name, value) in [
            ("n_ctx", params.n_ctx),
            ("n_batch", params.n_batch),
            ("n_threads", params.n_threads),
            ("n_seq_max", params.n_seq_max),
        ] {
            if value == 0 {
                return Err(EvalError::InvalidParams(format!("{} must be > 0", name)));
            }
        }

        let caches = (0..params.n_seq_max)
            .map(|_| model.architecture().new_cache(params.n_ctx))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(EvalContext {
            backend: CpuBackend::with_threads(params.n_threads),
            params,
            caches,
            outputs: Vec::new(),
        })
    }

    pub fn params(&self) -> &ContextParams {
        &self.params
    }

    /// Evaluate every entry of `batch` in order.
    ///
    /// The whole batch is validated before any cache is touched: each slot's
    /// positions must continue exactly from its current length and stay below
    /// `n_ctx`. Logits from the previous call are discarded first.
    pub fn decode(&mut self, model: &Model, batch: &Batch) -> Result<(), EvalError> {
        self.outputs.clear();
        self.validate(model, batch)?;

        let arch = model.architecture();
        for entry in batch.entries() {
            let logits = arch.forward(
                &mut self.caches[entry.seq],
                entry.token,
                entry.pos,
                entry.logits,
                &self.backend,
            )?;
            self.outputs.push(logits);
        }
        Ok(())
    }

    fn validate(&self, model: &Model, batch: &Batch) -> Result<(), EvalError> {
        if batch.is_empty() {
            return Err(EvalError::EmptyBatch);
        }
        if batch.len() > self.params.n_batch {
            return Err(EvalError::BatchTooLarge {
                len: batch.len(),
                capacity: self.params.n_batch,
            });
        }

        let n_vocab = model.meta().n_vocab;
        let mut next: Vec<usize> = self.caches.iter().map(KvCache::len).collect();
        for entry in batch.entries() {
            let expected = next
                .get_mut(entry.seq)
                .ok_or(EvalError::InvalidSequence {
                    seq: entry.seq,
                    n_seq_max: self.params.n_seq_max,
                })?;
            if entry.token as usize >= n_vocab {
                return Err(EvalError::InvalidToken {
                    token: entry.token,
                    n_vocab,
                });
            }
            if entry.pos != *expected {
                return Err(EvalError::PositionOutOfOrder {
                    seq: entry.seq,
                    expected: *expected,
                    got: entry.pos,
                });
            }
            if entry.pos >= self.params.n_ctx {
                return Err(EvalError::ContextExhausted {
                    pos: entry.pos,
                    n_ctx: self.params.n_ctx,
                });
            }
            *expected += 1;
        }
        Ok(())
    }

    /// Logits for entry `i` of the last decoded batch, if it requested them.
    pub fn logits_ith(&self, i: usize) -> Option<&[f32]> {
        self.outputs.get(i)?.as_deref()
    }

    /// Number of positions stored for `seq`.
    pub fn seq_len(&self, seq: usize) -> Option<usize> {
        self.caches.get(seq).map(KvCache::len)
    }

    /// Forget every slot's history and the last outputs.
    pub fn clear(&mut self) {
        for cache in &mut self.caches {
            cache.clear();
        }
        self.outputs.clear();
    }
}
