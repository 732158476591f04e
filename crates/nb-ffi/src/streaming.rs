use std::ffi::CString;
use std::os::raw::c_void;

use crate::types::NbStreamCallback;

/// Hand one fragment to the host callback, if there is one.
pub fn invoke_callback(callback: NbStreamCallback, user_data: *mut c_void, fragment: &str) {
    if let Some(cb) = callback {
        // Fragments never contain NUL in practice; drop it rather than the text.
        let c_str = match CString::new(fragment) {
            Ok(s) => s,
            Err(_) => match CString::new(fragment.replace('\0', "")) {
                Ok(s) => s,
                Err(_) => return,
            },
        };
        cb(c_str.as_ptr(), user_data);
    }
}
