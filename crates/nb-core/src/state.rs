use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::session::Session;
use crate::store::ModelStore;

/// A model with its live session.
///
/// Field order matters: the session is dropped before the model it was
/// created from.
#[derive(Debug)]
pub struct SessionReady {
    pub session: Session,
    pub store: ModelStore,
}

/// Shared inference state of a bridge.
///
/// Transitions consume the previous value, so the only paths are
/// Empty -> ModelLoaded -> SessionReady and back down through `teardown`.
#[derive(Debug, Default)]
pub enum BridgeState {
    #[default]
    Empty,
    ModelLoaded(ModelStore),
    SessionReady(SessionReady),
}

impl BridgeState {
    pub fn name(&self) -> &'static str {
        match self {
            BridgeState::Empty => "empty",
            BridgeState::ModelLoaded(_) => "model-loaded",
            BridgeState::SessionReady(_) => "session-ready",
        }
    }

    /// Create a session for a loaded model.
    ///
    /// On failure the model is released too: the state is consumed and the
    /// caller is left with `Empty`.
    pub fn open_session(self, config: &SessionConfig) -> Result<BridgeState, SessionError> {
        match self {
            BridgeState::Empty => Err(SessionError::NotLoaded),
            BridgeState::ModelLoaded(store) => match Session::create(&store, config) {
                Ok(session) => Ok(BridgeState::SessionReady(SessionReady { session, store })),
                Err(e) => {
                    store.unload();
                    Err(e)
                }
            },
            ready @ BridgeState::SessionReady(_) => Ok(ready),
        }
    }

    /// Destroy the session, then the model.
    pub fn teardown(self) -> BridgeState {
        match self {
            BridgeState::Empty => {}
            BridgeState::ModelLoaded(store) => store.unload(),
            BridgeState::SessionReady(SessionReady { session, store }) => {
                session.destroy();
                store.unload();
            }
        }
        BridgeState::Empty
    }

    pub fn store(&self) -> Option<&ModelStore> {
        match self {
            BridgeState::Empty => None,
            BridgeState::ModelLoaded(store) => Some(store),
            BridgeState::SessionReady(ready) => Some(&ready.store),
        }
    }

    pub fn ready_mut(&mut self) -> Option<&mut SessionReady> {
        match self {
            BridgeState::SessionReady(ready) => Some(ready),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, BridgeState::SessionReady(_))
    }
}
