//! Turns a raw `ExecutionResult` into a success envelope.
//!
//! # Design
//! The declared `Content-Type` picks a bucket first. Only when the header is
//! missing or says nothing useful does the body itself decide: valid UTF-8
//! is text, anything else is binary. A body cut off by the byte cap may end
//! in the middle of a character; that still counts as text.
//!
//! JSON that fails to parse is returned as text under `content_type: json`
//! (`FormatDegraded`). The call still succeeds.
//!
//! Text is never decoded lossily. A body declared as text or JSON that is
//! not UTF-8 is reported as binary, so the delivered body can never be
//! larger than the bytes actually read.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::config::Redaction;
use crate::envelope::{Body, ContentKind, ResponseEnvelope, SuccessEnvelope};
use crate::http::ExecutionResult;

pub const REDACTED: &str = "[REDACTED]";

const BINARY_TYPES: &[&str] = &[
    "application/octet-stream",
    "application/pdf",
    "application/zip",
    "application/gzip",
    "application/x-tar",
    "application/x-protobuf",
    "application/wasm",
];

const BINARY_FAMILIES: &[&str] = &["image/", "audio/", "video/", "font/"];

/// Build the success envelope for `result`.
pub fn format(result: ExecutionResult, redaction: &Redaction) -> ResponseEnvelope {
    let mut content_type = classify(result.header("content-type"), &result.body, result.truncated);
    let body = match content_type {
        ContentKind::Json => json_body(&result.body, result.truncated, redaction),
        ContentKind::Text => decode_text(&result.body, result.truncated).map(Body::Text),
        ContentKind::Binary => None,
    }
    .unwrap_or_else(|| {
        content_type = ContentKind::Binary;
        Body::Binary(result.body.len())
    });

    let envelope = SuccessEnvelope {
        status_code: result.status,
        headers: redact_headers(&result.headers, redaction),
        body,
        content_type,
        url: result.final_url.to_string(),
        elapsed_ms: result.elapsed.as_secs_f64() * 1000.0,
        truncated: result.truncated,
    };
    if envelope.is_degraded() {
        tracing::warn!(url = %envelope.url, "response declared JSON but did not parse; returning raw text");
    }
    ResponseEnvelope::Success(envelope)
}

/// Bucket a body by declared type, falling back to a UTF-8 probe.
pub fn classify(declared: Option<&str>, body: &[u8], truncated: bool) -> ContentKind {
    let essence = declared
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if essence.contains("json") {
        return ContentKind::Json;
    }
    if essence.starts_with("text/")
        || essence.contains("xml")
        || essence.contains("html")
        || essence.contains("javascript")
        || essence == "application/x-www-form-urlencoded"
    {
        return if is_text(body, truncated) {
            ContentKind::Text
        } else {
            ContentKind::Binary
        };
    }
    if BINARY_TYPES.contains(&essence.as_str())
        || BINARY_FAMILIES.iter().any(|family| essence.starts_with(family))
    {
        return ContentKind::Binary;
    }
    if is_text(body, truncated) {
        ContentKind::Text
    } else {
        ContentKind::Binary
    }
}

fn is_text(body: &[u8], truncated: bool) -> bool {
    match std::str::from_utf8(body) {
        Ok(_) => true,
        // error_len() is None only for an incomplete sequence at the very end.
        Err(err) => truncated && err.error_len().is_none(),
    }
}

/// Decode `body` without substituting replacement characters, so the text
/// is never longer than the bytes read. A truncated body may lose an
/// incomplete trailing character; any other invalid byte yields `None`.
fn decode_text(body: &[u8], truncated: bool) -> Option<String> {
    match std::str::from_utf8(body) {
        Ok(text) => Some(text.to_string()),
        Err(err) if truncated && err.error_len().is_none() => {
            std::str::from_utf8(&body[..err.valid_up_to()]).ok().map(str::to_string)
        }
        Err(_) => None,
    }
}

fn json_body(body: &[u8], truncated: bool, redaction: &Redaction) -> Option<Body> {
    match serde_json::from_slice::<Value>(body) {
        Ok(mut value) => {
            if !redaction.json_keys.is_empty() {
                redact_json(&mut value, redaction);
            }
            Some(Body::Json(value))
        }
        Err(_) => decode_text(body, truncated).map(Body::Text),
    }
}

fn redact_json(value: &mut Value, redaction: &Redaction) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map.iter_mut() {
                if redaction.json_keys.contains(&key.to_ascii_lowercase()) {
                    *inner = Value::String(REDACTED.to_string());
                } else {
                    redact_json(inner, redaction);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|item| redact_json(item, redaction)),
        _ => {}
    }
}

/// Collapse headers into a name→value map, replacing sensitive values.
///
/// Repeated headers are joined with `", "`.
pub fn redact_headers(headers: &[(String, String)], redaction: &Redaction) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.to_ascii_lowercase();
        if redaction.headers.contains(&name) {
            out.insert(name, REDACTED.to_string());
            continue;
        }
        out.entry(name)
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.clone());
    }
    out
}
