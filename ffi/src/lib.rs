//! C-ABI wrapper around `egress-core`.
//!
//! # Overview
//! Exposes the gateway through `extern "C"` functions that take JSON in and
//! hand JSON back, so any language with a C FFI can make allowlisted
//! outbound requests without knowing Rust types.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - `egress_gateway_fetch` always returns a response envelope, even for
//!   null or malformed arguments. A caller only ever parses one shape.
//! - The C caller owns all returned pointers and must release them with
//!   `egress_string_free` or `egress_gateway_free`.

pub mod types;

use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};

use egress_core::{report, GatewayConfig, GatewayError, ResponseEnvelope};

use types::*;

// ---------------------------------------------------------------------------
// Gateway lifecycle
// ---------------------------------------------------------------------------

/// Create a gateway from a JSON configuration document.
///
/// `EGRESS_ALLOWED_DOMAINS`, when set, replaces `allowed_domains`.
/// Returns null if `config_json` is null, unparseable or invalid. In that
/// case, if `error_out` is non-null it receives a message the caller must
/// free with `egress_string_free`.
#[unsafe(no_mangle)]
pub extern "C" fn egress_gateway_new(
    config_json: *const c_char,
    error_out: *mut *mut c_char,
) -> *mut FfiGateway {
    let built = catch_unwind(|| {
        let raw = unsafe { read_c_str(config_json) }.map_err(|err| match err {
            CStrError::Null => "null argument: config_json".to_string(),
            CStrError::NotUtf8 => "config_json is not valid UTF-8".to_string(),
        })?;
        let settings = GatewayConfig::from_json_str(raw)
            .map(GatewayConfig::with_env_overrides)
            .and_then(|config| config.build())
            .map_err(|err| err.to_string())?;
        Ok::<_, String>(egress_core::Gateway::new(settings))
    })
    .unwrap_or_else(|_| Err("panic while building gateway".to_string()));

    match built {
        Ok(gateway) => Box::into_raw(Box::new(FfiGateway { inner: gateway })),
        Err(message) => {
            tracing::error!(error = %message, "gateway construction failed");
            if !error_out.is_null() {
                unsafe { *error_out = into_c_string(message) };
            }
            std::ptr::null_mut()
        }
    }
}

/// Free a gateway created by `egress_gateway_new`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn egress_gateway_free(gateway: *mut FfiGateway) {
    if !gateway.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { Box::from_raw(gateway) });
        });
    }
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

/// Run one outbound call described by `request_json`.
///
/// Blocks until the call finishes or its timeout expires. Never returns
/// null; free the result with `egress_string_free`.
#[unsafe(no_mangle)]
pub extern "C" fn egress_gateway_fetch(
    gateway: *const FfiGateway,
    request_json: *const c_char,
) -> *mut c_char {
    catch_unwind(AssertUnwindSafe(|| {
        if gateway.is_null() {
            return envelope_to_c(&invalid("null argument: gateway"));
        }
        let gateway = unsafe { &*gateway };
        let envelope = match unsafe { read_c_str(request_json) } {
            Ok(raw) => gateway.inner.handle_json(raw),
            Err(CStrError::Null) => invalid("null argument: request_json"),
            Err(CStrError::NotUtf8) => invalid("request_json is not valid UTF-8"),
        };
        envelope_to_c(&envelope)
    }))
    .unwrap_or_else(|_| into_c_string(PANIC_ENVELOPE.to_string()))
}

fn invalid(reason: &'static str) -> ResponseEnvelope {
    report::to_envelope(&GatewayError::InvalidRequest { reason, detail: None })
}

/// Free a C string allocated by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn egress_string_free(s: *mut c_char) {
    if !s.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { std::ffi::CString::from_raw(s) });
        });
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
