mod context;
mod error;
mod global;
mod streaming;
mod types;

pub use context::*;
pub use error::*;
pub use global::*;
pub use types::*;

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::panic::{self, AssertUnwindSafe};

use nb_core::{BridgeConfig, BridgeError, GenerationResult};

/// Run `f`, returning `fallback` if it panics.
///
/// Bridge state is only ever replaced by value under its lock, so a panic
/// cannot leave it half-updated.
pub(crate) fn catch_panic<T>(fallback: T, f: impl FnOnce() -> T) -> T {
    catch_panic_or_else(|| fallback, f)
}

/// Like `catch_panic`, building the fallback only when `f` panics.
pub(crate) fn catch_panic_or_else<T>(fallback: impl FnOnce() -> T, f: impl FnOnce() -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            set_last_error("internal panic");
            fallback()
        }
    }
}

/// Borrow a C string as UTF-8, recording the problem on failure.
pub(crate) unsafe fn str_arg<'a>(ptr: *const c_char, what: &str) -> Option<&'a str> {
    if ptr.is_null() {
        set_last_error(format!("{} is null", what));
        return None;
    }
    match CStr::from_ptr(ptr).to_str() {
        Ok(s) => Some(s),
        Err(e) => {
            set_last_error(format!("invalid {}: {}", what, e));
            None
        }
    }
}

/// Move a Rust string to the caller. Interior NULs are dropped.
pub(crate) fn into_c_string(s: String) -> *mut c_char {
    let s = if s.contains('\0') { s.replace('\0', "") } else { s };
    match CString::new(s) {
        Ok(c) => c.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

fn status_of(e: &BridgeError) -> NbStatus {
    set_last_error(e.to_string());
    NbStatus::from(e)
}

unsafe fn write_result(
    result: GenerationResult,
    output: *mut *mut c_char,
    stop_reason: *mut NbStopReason,
    tokens_generated: *mut u32,
) {
    if let Some(message) = result.stop_reason.failure_message() {
        set_last_error(message);
    }
    if !stop_reason.is_null() {
        *stop_reason = NbStopReason::from(&result.stop_reason);
    }
    if !tokens_generated.is_null() {
        *tokens_generated = u32::try_from(result.tokens_generated).unwrap_or(u32::MAX);
    }
    if !output.is_null() {
        *output = into_c_string(result.text);
    }
}

/// Create a new bridge context.
///
/// `config_json` may be null, in which case the configuration comes from the
/// file named by `NATIVE_BRIDGE_CONFIG`, or the defaults. On success writes a
/// heap-allocated `NbContext` into `*ctx_out`; free it with
/// `nb_context_destroy`.
#[no_mangle]
pub unsafe extern "C" fn nb_context_create(
    config_json: *const c_char,
    ctx_out: *mut *mut NbContext,
) -> NbStatus {
    catch_panic(NbStatus::ErrorInternal, || {
        if ctx_out.is_null() {
            set_last_error("ctx_out is null");
            return NbStatus::ErrorInvalidArgument;
        }
        let config = if config_json.is_null() {
            BridgeConfig::from_env()
        } else {
            match str_arg(config_json, "config") {
                Some(json) => BridgeConfig::from_json_str(json),
                None => return NbStatus::ErrorInvalidArgument,
            }
        };
        match config {
            Ok(config) => {
                *ctx_out = Box::into_raw(Box::new(NbContext::new(config)));
                NbStatus::Ok
            }
            Err(e) => {
                set_last_error(e.to_string());
                NbStatus::ErrorInvalidArgument
            }
        }
    })
}

/// Destroy a context created by `nb_context_create`. Null is a no-op.
#[no_mangle]
pub unsafe extern "C" fn nb_context_destroy(ctx: *mut NbContext) -> NbStatus {
    catch_panic(NbStatus::ErrorInternal, || {
        if !ctx.is_null() {
            drop(Box::from_raw(ctx));
        }
        NbStatus::Ok
    })
}

/// Load a GGUF model into the context, replacing any previous one.
///
/// On success writes the new model handle into `*handle_out` when it is
/// not null.
#[no_mangle]
pub unsafe extern "C" fn nb_context_load_model(
    ctx: *mut NbContext,
    model_path: *const c_char,
    handle_out: *mut u64,
) -> NbStatus {
    catch_panic(NbStatus::ErrorInternal, || {
        if ctx.is_null() {
            set_last_error("ctx is null");
            return NbStatus::ErrorInvalidArgument;
        }
        let ctx = &*ctx;
        let Some(path) = str_arg(model_path, "model path") else {
            return NbStatus::ErrorInvalidArgument;
        };
        match ctx.bridge.load_model(path) {
            Ok(handle) => {
                if !handle_out.is_null() {
                    *handle_out = handle.get();
                }
                NbStatus::Ok
            }
            Err(e) => status_of(&e),
        }
    })
}

/// Generate up to `max_tokens` tokens continuing `prompt`.
///
/// On success `*output` receives the generated text (free it with
/// `nb_free_string`). `stop_reason` and `tokens_generated` are optional.
/// A decode failure mid-generation still returns `NB_STATUS_OK` with the
/// partial text and `NB_STOP_REASON_DECODE_FAILED`; the message is
/// available from `nb_last_error`.
#[no_mangle]
pub unsafe extern "C" fn nb_context_generate(
    ctx: *mut NbContext,
    prompt: *const c_char,
    max_tokens: u32,
    output: *mut *mut c_char,
    stop_reason: *mut NbStopReason,
    tokens_generated: *mut u32,
) -> NbStatus {
    catch_panic(NbStatus::ErrorInternal, || {
        if ctx.is_null() || output.is_null() {
            set_last_error("null argument");
            return NbStatus::ErrorInvalidArgument;
        }
        let ctx = &*ctx;
        let Some(prompt) = str_arg(prompt, "prompt") else {
            return NbStatus::ErrorInvalidArgument;
        };
        match ctx.bridge.generate(prompt, max_tokens as usize) {
            Ok(result) => {
                write_result(result, output, stop_reason, tokens_generated);
                NbStatus::Ok
            }
            Err(e) => status_of(&e),
        }
    })
}

/// Generate like `nb_context_generate`, passing each piece of text to
/// `callback` as soon as it is complete. The full text is not returned.
#[no_mangle]
pub unsafe extern "C" fn nb_context_generate_streaming(
    ctx: *mut NbContext,
    prompt: *const c_char,
    max_tokens: u32,
    callback: NbStreamCallback,
    user_data: *mut c_void,
    stop_reason: *mut NbStopReason,
    tokens_generated: *mut u32,
) -> NbStatus {
    catch_panic(NbStatus::ErrorInternal, || {
        if ctx.is_null() {
            set_last_error("ctx is null");
            return NbStatus::ErrorInvalidArgument;
        }
        let ctx = &*ctx;
        let Some(prompt) = str_arg(prompt, "prompt") else {
            return NbStatus::ErrorInvalidArgument;
        };
        let result = ctx.bridge.generate_streaming(prompt, max_tokens as usize, |fragment| {
            streaming::invoke_callback(callback, user_data, fragment)
        });
        match result {
            Ok(result) => {
                write_result(result, std::ptr::null_mut(), stop_reason, tokens_generated);
                NbStatus::Ok
            }
            Err(e) => status_of(&e),
        }
    })
}

/// Describe the loaded model, or return `"no model loaded"`.
/// Free the result with `nb_free_string`. Returns null if `ctx` is null.
#[no_mangle]
pub unsafe extern "C" fn nb_context_model_info(ctx: *mut NbContext) -> *mut c_char {
    catch_panic(std::ptr::null_mut(), || {
        if ctx.is_null() {
            set_last_error("ctx is null");
            return std::ptr::null_mut();
        }
        into_c_string((*ctx).bridge.model_info_text())
    })
}

/// Release the context's session and model. The context stays usable.
#[no_mangle]
pub unsafe extern "C" fn nb_context_cleanup(ctx: *mut NbContext) -> NbStatus {
    catch_panic(NbStatus::ErrorInternal, || {
        if ctx.is_null() {
            set_last_error("ctx is null");
            return NbStatus::ErrorInvalidArgument;
        }
        (*ctx).bridge.cleanup();
        NbStatus::Ok
    })
}

/// Take the calling thread's most recent error message.
///
/// Returns null if there is none. Free the result with `nb_free_string`.
#[no_mangle]
pub extern "C" fn nb_last_error() -> *mut c_char {
    match take_last_error() {
        Some(e) => e.into_raw(),
        None => std::ptr::null_mut(),
    }
}

/// Free a string returned by any `nb_*` function. Null is a no-op.
#[no_mangle]
pub unsafe extern "C" fn nb_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::ffi::{CStr, CString};
    use std::os::raw::c_char;
    use std::path::PathBuf;

    use nb_model::fixtures::TinyLlama;

    pub fn sky_model(dir: &tempfile::TempDir) -> CString {
        let path: PathBuf = dir.path().join("sky.gguf");
        TinyLlama::new()
            .with_name("Tiny Sky")
            .with_sequence(&["s", "▁", "b", "l", "u", "e", "</s>"])
            .write_to(&path)
            .unwrap();
        CString::new(path.to_str().unwrap()).unwrap()
    }

    /// Copy and free an owned string.
    pub unsafe fn take(s: *mut c_char) -> String {
        assert!(!s.is_null());
        let text = CStr::from_ptr(s).to_str().unwrap().to_owned();
        super::nb_free_string(s);
        text
    }

    pub fn last_error() -> Option<String> {
        let e = super::nb_last_error();
        if e.is_null() {
            None
        } else {
            Some(unsafe { take(e) })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use nb_model::fixtures::TinyLlama;
    use std::ptr;

    const CONFIG: &str = r#"{"session": {"n_ctx": 128, "n_batch": 16, "n_threads": 1}}"#;

    unsafe fn context() -> *mut NbContext {
        let config = CString::new(CONFIG).unwrap();
        let mut ctx = ptr::null_mut();
        assert_eq!(nb_context_create(config.as_ptr(), &mut ctx), NbStatus::Ok);
        assert!(!ctx.is_null());
        ctx
    }

    #[test]
    fn test_generate_reports_stop_reason_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = sky_model(&dir);
        let prompt = CString::new("The sky is").unwrap();
        unsafe {
            let ctx = context();
            let mut handle = 0u64;
            assert_eq!(nb_context_load_model(ctx, path.as_ptr(), &mut handle), NbStatus::Ok);
            assert_eq!(handle, 1);

            let mut out = ptr::null_mut();
            let mut reason = NbStopReason::DecodeFailed;
            let mut count = 0u32;
            let status = nb_context_generate(
                ctx,
                prompt.as_ptr(),
                20,
                &mut out,
                &mut reason,
                &mut count,
            );
            assert_eq!(status, NbStatus::Ok);
            assert_eq!(take(out), " blue");
            assert_eq!(reason, NbStopReason::EndOfSequence);
            assert_eq!(count, 5);

            let status = nb_context_generate(
                ctx,
                prompt.as_ptr(),
                2,
                &mut out,
                &mut reason,
                ptr::null_mut(),
            );
            assert_eq!(status, NbStatus::Ok);
            assert_eq!(take(out), " b");
            assert_eq!(reason, NbStopReason::MaxTokens);

            nb_context_destroy(ctx);
        }
    }

    #[test]
    fn test_generate_without_model_is_not_loaded() {
        let prompt = CString::new("hello").unwrap();
        unsafe {
            let ctx = context();
            let mut out = ptr::null_mut();
            let status = nb_context_generate(
                ctx,
                prompt.as_ptr(),
                10,
                &mut out,
                ptr::null_mut(),
                ptr::null_mut(),
            );
            assert_eq!(status, NbStatus::ErrorNotLoaded);
            assert!(out.is_null());
            assert!(last_error().is_some());
            assert_eq!(take(nb_context_model_info(ctx)), "no model loaded");
            nb_context_destroy(ctx);
        }
    }

    #[test]
    fn test_missing_model_fails_to_load() {
        let path = CString::new("/nonexistent/missing.gguf").unwrap();
        unsafe {
            let ctx = context();
            let mut handle = 7u64;
            let status = nb_context_load_model(ctx, path.as_ptr(), &mut handle);
            assert_eq!(status, NbStatus::ErrorModelLoad);
            assert_eq!(handle, 7);
            assert!(last_error().unwrap().contains("missing.gguf"));
            nb_context_destroy(ctx);
        }
    }

    #[test]
    fn test_null_arguments_are_rejected() {
        unsafe {
            assert_eq!(
                nb_context_create(ptr::null(), ptr::null_mut()),
                NbStatus::ErrorInvalidArgument
            );
            assert_eq!(last_error().as_deref(), Some("ctx_out is null"));
            assert_eq!(
                nb_context_load_model(ptr::null_mut(), ptr::null(), ptr::null_mut()),
                NbStatus::ErrorInvalidArgument
            );
            assert_eq!(nb_context_cleanup(ptr::null_mut()), NbStatus::ErrorInvalidArgument);
            assert!(nb_context_model_info(ptr::null_mut()).is_null());
            assert_eq!(nb_context_destroy(ptr::null_mut()), NbStatus::Ok);
            nb_free_string(ptr::null_mut());
        }
    }

    #[test]
    fn test_bad_config_json_is_rejected() {
        let config = CString::new("{not json").unwrap();
        let mut ctx = ptr::null_mut();
        unsafe {
            assert_eq!(
                nb_context_create(config.as_ptr(), &mut ctx),
                NbStatus::ErrorInvalidArgument
            );
        }
        assert!(ctx.is_null());
        assert!(last_error().is_some());
    }

    #[test]
    fn test_empty_prompt_is_invalid_argument() {
        let dir = tempfile::tempdir().unwrap();
        let path = sky_model(&dir);
        let prompt = CString::new("").unwrap();
        unsafe {
            let ctx = context();
            assert_eq!(nb_context_load_model(ctx, path.as_ptr(), ptr::null_mut()), NbStatus::Ok);
            let mut out = ptr::null_mut();
            let status = nb_context_generate(
                ctx,
                prompt.as_ptr(),
                5,
                &mut out,
                ptr::null_mut(),
                ptr::null_mut(),
            );
            assert_eq!(status, NbStatus::ErrorInvalidArgument);
            nb_context_destroy(ctx);
        }
    }

    extern "C" fn collect(fragment: *const c_char, user_data: *mut c_void) {
        let out = unsafe { &mut *(user_data as *mut Vec<String>) };
        let s = unsafe { CStr::from_ptr(fragment) }.to_str().unwrap();
        out.push(s.to_owned());
    }

    #[test]
    fn test_streaming_delivers_fragments() {
        let dir = tempfile::tempdir().unwrap();
        let path = sky_model(&dir);
        let prompt = CString::new("The sky is").unwrap();
        let mut fragments: Vec<String> = Vec::new();
        unsafe {
            let ctx = context();
            assert_eq!(nb_context_load_model(ctx, path.as_ptr(), ptr::null_mut()), NbStatus::Ok);
            let mut reason = NbStopReason::DecodeFailed;
            let status = nb_context_generate_streaming(
                ctx,
                prompt.as_ptr(),
                20,
                Some(collect),
                &mut fragments as *mut Vec<String> as *mut c_void,
                &mut reason,
                ptr::null_mut(),
            );
            assert_eq!(status, NbStatus::Ok);
            assert_eq!(reason, NbStopReason::EndOfSequence);
            nb_context_destroy(ctx);
        }
        assert_eq!(fragments.concat(), " blue");
    }

    #[test]
    fn test_decode_failure_returns_partial_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cycle.gguf");
        TinyLlama::new()
            .with_transition("a", "b")
            .with_transition("b", "a")
            .write_to(&path)
            .unwrap();
        let path = CString::new(path.to_str().unwrap()).unwrap();
        let config = CString::new(r#"{"session": {"n_ctx": 8, "n_batch": 8, "n_threads": 1}}"#)
            .unwrap();
        let prompt = CString::new("a").unwrap();
        unsafe {
            let mut ctx = ptr::null_mut();
            assert_eq!(nb_context_create(config.as_ptr(), &mut ctx), NbStatus::Ok);
            assert_eq!(
                nb_context_load_model(ctx, path.as_ptr(), ptr::null_mut()),
                NbStatus::Ok
            );

            let mut out = ptr::null_mut();
            let mut reason = NbStopReason::EndOfSequence;
            let mut count = 0u32;
            let status = nb_context_generate(
                ctx,
                prompt.as_ptr(),
                100,
                &mut out,
                &mut reason,
                &mut count,
            );
            assert_eq!(status, NbStatus::Ok);
            assert_eq!(reason, NbStopReason::DecodeFailed);
            // BOS, space and "a" leave room for five more positions.
            assert_eq!(take(out), "bababa");
            assert_eq!(count, 6);
            assert!(last_error().unwrap().contains("context window exhausted"));
            nb_context_destroy(ctx);
        }
    }

    #[test]
    fn test_catch_panic_or_else_builds_fallback_lazily() {
        let mut built = false;
        let value = catch_panic_or_else(
            || {
                built = true;
                0
            },
            || 7,
        );
        assert_eq!(value, 7);
        assert!(!built);
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = sky_model(&dir);
        unsafe {
            let ctx = context();
            assert_eq!(nb_context_load_model(ctx, path.as_ptr(), ptr::null_mut()), NbStatus::Ok);
            assert!(take(nb_context_model_info(ctx)).contains("Name: Tiny Sky"));
            assert_eq!(nb_context_cleanup(ctx), NbStatus::Ok);
            assert_eq!(nb_context_cleanup(ctx), NbStatus::Ok);
            assert_eq!(take(nb_context_model_info(ctx)), "no model loaded");
            nb_context_destroy(ctx);
        }
    }

    #[test]
    fn test_catch_panic_returns_fallback() {
        let status = catch_panic(NbStatus::ErrorInternal, || panic!("boom"));
        assert_eq!(status, NbStatus::ErrorInternal);
        assert_eq!(last_error().as_deref(), Some("internal panic"));
    }
}
