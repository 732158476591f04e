//! `nb-core` - the native-bridge core.
//!
//! Owns the model-session lifecycle and the generation loop behind a single
//! lock-guarded `Bridge`:
//! - `ModelStore` / `Session`: model weights and the evaluation context bound to them
//! - `TokenizerAdapter`: prompt encoding and streaming UTF-8 detokenization
//! - `BatchDecoder`: batch submission and logit access
//! - `GenerationLoop`: prefill, token selection, termination
//! - `BridgeState`: the Empty / ModelLoaded / SessionReady state machine

pub mod bridge;
pub mod config;
pub mod decoder;
pub mod error;
pub mod generate;
pub mod logging;
pub mod session;
pub mod state;
pub mod store;
pub mod tokenizer;

pub use bridge::{Bridge, NO_MODEL_LOADED};
pub use config::{BridgeConfig, GenerationDefaults, ModelParams, SamplingConfig, SessionConfig};
pub use error::{BridgeError, ConfigError, DecodeError, LoadError, SessionError};
pub use generate::{GenerationLoop, GenerationResult, StopReason};
pub use session::Session;
pub use state::BridgeState;
pub use store::{ModelHandle, ModelInfo, ModelStore};
pub use tokenizer::{PieceDecoder, TokenizerAdapter};
