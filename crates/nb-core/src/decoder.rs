use nb_model::Batch;

use crate::error::DecodeError;
use crate::session::Session;
use crate::store::ModelStore;

/// Submits batches to a session's evaluation context.
pub struct BatchDecoder;

impl BatchDecoder {
    /// Evaluate `batch`, advancing each slot's cache by its entries.
    ///
    /// The batch is validated whole before any cache changes.
    pub fn decode(
        session: &mut Session,
        store: &ModelStore,
        batch: &Batch,
    ) -> Result<(), DecodeError> {
        debug_assert_eq!(session.model_handle(), store.handle());
        session.context_mut().decode(store.model(), batch)?;
        Ok(())
    }

    /// Logits for entry `index` of the last decoded batch. Valid until the
    /// next decode.
    pub fn logits(session: &Session, index: usize) -> Option<&[f32]> {
        session.context().logits_ith(index)
    }
}
