//! Handle and string helpers for the FFI boundary.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use egress_core::{Gateway, ResponseEnvelope};

/// Opaque handle to a `Gateway`. C callers receive a pointer to this and
/// pass it back into `egress_gateway_fetch`.
pub struct FfiGateway {
    pub(crate) inner: Gateway,
}

/// Envelope returned when a panic was caught at the boundary.
pub(crate) const PANIC_ENVELOPE: &str =
    r#"{"success":false,"error":"internal gateway failure","troubleshooting":["Check the gateway logs for more details","Retry the request"]}"#;

/// Move `s` onto the C heap. Interior NULs are dropped rather than failing.
pub(crate) fn into_c_string(s: String) -> *mut c_char {
    let s = match CString::new(s) {
        Ok(c) => return c.into_raw(),
        Err(err) => err.into_vec(),
    };
    let cleaned: Vec<u8> = s.into_iter().filter(|&b| b != 0).collect();
    CString::new(cleaned).unwrap_or_default().into_raw()
}

/// Serialize an envelope for the caller.
pub(crate) fn envelope_to_c(envelope: &ResponseEnvelope) -> *mut c_char {
    into_c_string(envelope.to_json().to_string())
}

/// Why a caller string could not be borrowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CStrError {
    Null,
    NotUtf8,
}

/// Borrow a caller string.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// for `'a`.
pub(crate) unsafe fn read_c_str<'a>(ptr: *const c_char) -> Result<&'a str, CStrError> {
    if ptr.is_null() {
        return Err(CStrError::Null);
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| CStrError::NotUtf8)
}
