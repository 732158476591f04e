//! Process-wide flat API: one bridge shared by every caller in the process.

use std::os::raw::c_char;
use std::sync::OnceLock;

use nb_core::{logging, Bridge, BridgeConfig, BridgeError, GenerationResult, NO_MODEL_LOADED};
use tracing::warn;

use crate::{catch_panic, catch_panic_or_else, into_c_string, set_last_error, str_arg};

static BRIDGE: OnceLock<Bridge> = OnceLock::new();

fn bridge() -> &'static Bridge {
    BRIDGE.get_or_init(|| {
        let config = BridgeConfig::from_env().unwrap_or_else(|e| {
            warn!(error = %e, "ignoring bridge config");
            BridgeConfig::default()
        });
        Bridge::new(config)
    })
}

fn error_text(message: impl std::fmt::Display) -> String {
    format!("Error: {}", message)
}

/// Install logging and prepare the process-wide bridge.
/// Returns 1 on success, 0 on failure.
#[no_mangle]
pub extern "C" fn nb_initialize() -> i64 {
    catch_panic(0, || {
        logging::init();
        i64::from(bridge().initialize())
    })
}

/// Load a GGUF model, replacing any previous one.
///
/// Returns a positive handle, or 0 if loading failed. After a failure no
/// model is loaded.
#[no_mangle]
pub unsafe extern "C" fn nb_load_model(model_path: *const c_char) -> i64 {
    catch_panic(0, || {
        let Some(path) = str_arg(model_path, "model path") else {
            return 0;
        };
        match bridge().load_model(path) {
            Ok(handle) => i64::try_from(handle.get()).unwrap_or(0),
            Err(e) => {
                set_last_error(e.to_string());
                0
            }
        }
    })
}

/// Text handed back for a generation request: the generated text, the
/// not-loaded sentinel, or an error string.
fn generation_text(result: Result<GenerationResult, BridgeError>) -> String {
    match result {
        Ok(result) => match result.stop_reason.failure_message() {
            Some(message) if result.text.is_empty() => {
                set_last_error(message);
                error_text(message)
            }
            Some(message) => {
                set_last_error(message);
                result.text
            }
            None => result.text,
        },
        Err(BridgeError::NotLoaded) => NO_MODEL_LOADED.to_string(),
        Err(e) => {
            set_last_error(e.to_string());
            error_text(e)
        }
    }
}

/// Generate text continuing `prompt`.
///
/// A negative `max_tokens` uses the configured default. Always returns an
/// owned string: the generated text, `"no model loaded"`, or
/// `"Error: <message>"`, including when the call panics. A decode failure
/// after some text was produced returns that partial text and leaves the
/// message in `nb_last_error`. Free the result with `nb_free_string`.
#[no_mangle]
pub unsafe extern "C" fn nb_generate_text(prompt: *const c_char, max_tokens: i32) -> *mut c_char {
    catch_panic_or_else(
        || into_c_string(error_text("internal panic")),
        || {
            let Some(prompt) = str_arg(prompt, "prompt") else {
                return into_c_string(error_text("invalid prompt"));
            };
            let bridge = bridge();
            let max_tokens =
                usize::try_from(max_tokens).unwrap_or_else(|_| bridge.default_max_tokens());
            into_c_string(generation_text(bridge.generate(prompt, max_tokens)))
        },
    )
}

/// Describe the loaded model, or return `"no model loaded"`.
/// Free the result with `nb_free_string`.
#[no_mangle]
pub extern "C" fn nb_get_model_info() -> *mut c_char {
    catch_panic(std::ptr::null_mut(), || into_c_string(bridge().model_info_text()))
}

/// Release the process-wide session and model. Safe to call repeatedly.
#[no_mangle]
pub extern "C" fn nb_cleanup() {
    catch_panic((), || bridge().cleanup())
}

#[cfg(test)]
mod tests {
    use std::ffi::CString;

    use super::*;
    use crate::test_support::*;
    use nb_model::fixtures::TinyLlama;

    // The flat API shares one bridge per process, so the whole lifecycle
    // runs in a single test.
    #[test]
    fn test_flat_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = sky_model(&dir);
        let missing = CString::new("missing.gguf").unwrap();
        let prompt = CString::new("The sky is").unwrap();
        let empty = CString::new("").unwrap();

        unsafe {
            assert_eq!(nb_initialize(), 1);
            assert_eq!(nb_initialize(), 1);

            assert_eq!(take(nb_get_model_info()), "no model loaded");
            assert_eq!(take(nb_generate_text(prompt.as_ptr(), 10)), "no model loaded");

            assert_eq!(nb_load_model(missing.as_ptr()), 0);
            assert_eq!(take(nb_generate_text(prompt.as_ptr(), 10)), "no model loaded");
            assert_eq!(nb_load_model(std::ptr::null()), 0);

            let first = nb_load_model(path.as_ptr());
            assert!(first > 0);
            let info = take(nb_get_model_info());
            assert!(info.contains("Name: Tiny Sky"));
            assert!(info.contains("Architecture: llama"));

            assert_eq!(take(nb_generate_text(prompt.as_ptr(), 5)), " blue");
            assert_eq!(take(nb_generate_text(prompt.as_ptr(), 3)), " bl");
            assert_eq!(take(nb_generate_text(prompt.as_ptr(), -1)), " blue");
            assert!(take(nb_generate_text(empty.as_ptr(), 5)).starts_with("Error: "));
            assert!(take(nb_generate_text(std::ptr::null(), 5)).starts_with("Error: "));

            let second = nb_load_model(path.as_ptr());
            assert!(second > first);

            nb_cleanup();
            nb_cleanup();
            assert_eq!(take(nb_get_model_info()), "no model loaded");
            assert_eq!(take(nb_generate_text(prompt.as_ptr(), 5)), "no model loaded");
        }
    }

    fn cycle_bridge(dir: &tempfile::TempDir) -> Bridge {
        let path = dir.path().join("cycle.gguf");
        TinyLlama::new()
            .with_transition("a", "b")
            .with_transition("b", "a")
            .write_to(&path)
            .unwrap();
        let config = BridgeConfig::from_json_str(
            r#"{"session": {"n_ctx": 8, "n_batch": 8, "n_threads": 1}}"#,
        )
        .unwrap();
        let bridge = Bridge::new(config);
        bridge.load_model(&path).unwrap();
        bridge
    }

    #[test]
    fn test_decode_failure_keeps_partial_text() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = cycle_bridge(&dir);
        let text = generation_text(bridge.generate("a", 100));
        assert_eq!(text, "bababa");
        assert!(last_error().unwrap().contains("context window exhausted"));
    }

    #[test]
    fn test_decode_failure_without_text_is_error_string() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = cycle_bridge(&dir);
        // BOS, space and eight letters do not fit in eight positions.
        let text = generation_text(bridge.generate("abababab", 4));
        assert!(text.starts_with("Error: "));
        assert!(text.contains("context window exhausted"));
        assert!(last_error().is_some());
    }

    #[test]
    fn test_generation_text_sentinels() {
        assert_eq!(generation_text(Err(BridgeError::NotLoaded)), "no model loaded");
        let text = generation_text(Err(BridgeError::EmptyPrompt));
        assert_eq!(text, "Error: prompt produced no tokens");
    }
}
