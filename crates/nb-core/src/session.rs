use nb_model::{ContextParams, EvalContext, EvalError};
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::store::{ModelHandle, ModelStore};

/// Evaluation context bound to one loaded model.
///
/// Only the bridge state machine holds sessions, always next to the
/// `ModelStore` they were created from, and drops them first.
#[derive(Debug)]
pub struct Session {
    ctx: EvalContext,
    model: ModelHandle,
    seed: u64,
}

impl Session {
    pub fn create(store: &ModelStore, config: &SessionConfig) -> Result<Session, SessionError> {
        for (name, value) in [
            ("n_batch", config.n_batch),
            ("n_threads", config.n_threads),
            ("n_seq_max", config.n_seq_max),
        ] {
            if value == 0 {
                return Err(SessionError::InvalidConfig(format!("{} must be > 0", name)));
            }
        }

        let n_ctx_train = store.model().meta().n_ctx_train;
        let n_ctx = if config.n_ctx == 0 { n_ctx_train } else { config.n_ctx };
        if n_ctx > n_ctx_train {
            warn!(n_ctx, n_ctx_train, "context window exceeds the training context");
        }
        let params = ContextParams {
            n_ctx,
            n_batch: config.n_batch.min(n_ctx),
            n_threads: config.n_threads,
            n_seq_max: config.n_seq_max,
        };

        let ctx = EvalContext::new(store.model(), params).map_err(|e| match e {
            EvalError::InvalidParams(msg) => SessionError::InvalidConfig(msg),
            other => SessionError::ContextAllocation(other),
        })?;
        info!(
            model = %store.handle(),
            n_ctx,
            n_batch = ctx.params().n_batch,
            n_threads = config.n_threads,
            "session created"
        );

        Ok(Session {
            ctx,
            model: store.handle(),
            seed: config.seed,
        })
    }

    /// Clear every slot so positions restart at zero.
    pub fn reset(&mut self) {
        self.ctx.clear();
    }

    /// Release the context.
    pub fn destroy(self) {
        info!(model = %self.model, "session destroyed");
    }

    pub fn model_handle(&self) -> ModelHandle {
        self.model
    }

    pub fn n_ctx(&self) -> usize {
        self.ctx.params().n_ctx
    }

    pub fn n_batch(&self) -> usize {
        self.ctx.params().n_batch
    }

    pub fn n_threads(&self) -> usize {
        self.ctx.params().n_threads
    }

    pub fn n_seq_max(&self) -> usize {
        self.ctx.params().n_seq_max
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Positions stored for `seq`.
    pub fn seq_len(&self, seq: usize) -> Option<usize> {
        self.ctx.seq_len(seq)
    }

    pub(crate) fn context(&self) -> &EvalContext {
        &self.ctx
    }

    pub(crate) fn context_mut(&mut self) -> &mut EvalContext {
        &mut self.ctx
    }
}
