use std::os::raw::{c_char, c_void};

use nb_core::{BridgeError, StopReason};

/// Status codes returned by the context API.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NbStatus {
    Ok = 0,
    ErrorInvalidArgument = 1,
    ErrorModelLoad = 2,
    ErrorGenerate = 3,
    ErrorNotLoaded = 4,
    ErrorInternal = 5,
}

impl From<&BridgeError> for NbStatus {
    fn from(e: &BridgeError) -> Self {
        match e {
            BridgeError::Load(_) | BridgeError::Session(_) => NbStatus::ErrorModelLoad,
            BridgeError::NotLoaded => NbStatus::ErrorNotLoaded,
            BridgeError::EmptyPrompt => NbStatus::ErrorInvalidArgument,
            BridgeError::Decode(_) => NbStatus::ErrorGenerate,
        }
    }
}

/// Why a generation call stopped.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NbStopReason {
    EndOfSequence = 0,
    MaxTokens = 1,
    DecodeFailed = 2,
}

impl From<&StopReason> for NbStopReason {
    fn from(reason: &StopReason) -> Self {
        match reason {
            StopReason::EndOfSequence => NbStopReason::EndOfSequence,
            StopReason::MaxTokens => NbStopReason::MaxTokens,
            StopReason::DecodeFailed(_) => NbStopReason::DecodeFailed,
        }
    }
}

/// Receives each piece of generated text as a NUL-terminated UTF-8 string.
/// The pointer is only valid for the duration of the call.
pub type NbStreamCallback = Option<extern "C" fn(fragment: *const c_char, user_data: *mut c_void)>;
