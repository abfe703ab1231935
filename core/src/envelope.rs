//! The uniform response shape returned for every call.
//!
//! # Design
//! Success and failure are two Rust variants but one JSON shape with a
//! `success` flag, which is what callers key on:
//!
//! ```text
//! {"success": true,  "status_code": 200, "headers": {...}, "body": ...,
//!  "content_type": "json", "url": "...", "elapsed_ms": 12.5, "truncated": false}
//! {"success": false, "error": "...", "troubleshooting": ["...", "..."]}
//! ```

use std::collections::BTreeMap;

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;

/// Content classification of a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Json,
    Text,
    Binary,
}

/// A formatted response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(serde_json::Value),
    Text(String),
    /// Only the number of bytes delivered is reported.
    Binary(usize),
}

impl Serialize for Body {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Body::Json(value) => value.serialize(serializer),
            Body::Text(text) => serializer.serialize_str(text),
            Body::Binary(len) => serializer.serialize_str(&format!("<binary: {len} bytes>")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuccessEnvelope {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Body,
    pub content_type: ContentKind,
    pub url: String,
    pub elapsed_ms: f64,
    pub truncated: bool,
}

impl SuccessEnvelope {
    /// Declared JSON whose body did not parse and is returned as text.
    pub fn is_degraded(&self) -> bool {
        self.content_type == ContentKind::Json && matches!(self.body, Body::Text(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureEnvelope {
    pub error: String,
    pub troubleshooting: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEnvelope {
    Success(SuccessEnvelope),
    Failure(FailureEnvelope),
}

impl ResponseEnvelope {
    pub fn failure<I, S>(error: impl Into<String>, troubleshooting: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ResponseEnvelope::Failure(FailureEnvelope {
            error: error.into(),
            troubleshooting: troubleshooting.into_iter().map(Into::into).collect(),
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResponseEnvelope::Success(_))
    }

    pub fn as_success(&self) -> Option<&SuccessEnvelope> {
        match self {
            ResponseEnvelope::Success(success) => Some(success),
            ResponseEnvelope::Failure(_) => None,
        }
    }

    pub fn as_failure(&self) -> Option<&FailureEnvelope> {
        match self {
            ResponseEnvelope::Failure(failure) => Some(failure),
            ResponseEnvelope::Success(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|err| {
            serde_json::json!({
                "success": false,
                "error": format!("failed to serialize response: {err}"),
                "troubleshooting": []
            })
        })
    }
}

impl Serialize for ResponseEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ResponseEnvelope::Success(ok) => {
                let mut s = serializer.serialize_struct("ResponseEnvelope", 8)?;
                s.serialize_field("success", &true)?;
                s.serialize_field("status_code", &ok.status_code)?;
                s.serialize_field("headers", &ok.headers)?;
                s.serialize_field("body", &ok.body)?;
                s.serialize_field("content_type", &ok.content_type)?;
                s.serialize_field("url", &ok.url)?;
                s.serialize_field("elapsed_ms", &ok.elapsed_ms)?;
                s.serialize_field("truncated", &ok.truncated)?;
                s.end()
            }
            ResponseEnvelope::Failure(fail) => {
                let mut s = serializer.serialize_struct("ResponseEnvelope", 3)?;
                s.serialize_field("success", &false)?;
                s.serialize_field("error", &fail.error)?;
                s.serialize_field("troubleshooting", &fail.troubleshooting)?;
                s.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn success(body: Body, content_type: ContentKind) -> ResponseEnvelope {
        ResponseEnvelope::Success(SuccessEnvelope {
            status_code: 200,
            headers: BTreeMap::from([("content-type".to_string(), "application/json".to_string())]),
            body,
            content_type,
            url: "https://api.hvs/health".to_string(),
            elapsed_ms: 12.5,
            truncated: false,
        })
    }

    #[test]
    fn success_serializes_with_flag() {
        let env = success(Body::Json(json!({"status": "ok"})), ContentKind::Json);
        assert_eq!(
            env.to_json(),
            json!({
                "success": true,
                "status_code": 200,
                "headers": {"content-type": "application/json"},
                "body": {"status": "ok"},
                "content_type": "json",
                "url": "https://api.hvs/health",
                "elapsed_ms": 12.5,
                "truncated": false
            })
        );
    }

    #[test]
    fn binary_body_is_a_marker_string() {
        let env = success(Body::Binary(2048), ContentKind::Binary);
        let value = env.to_json();
        assert_eq!(value["body"], "<binary: 2048 bytes>");
        assert_eq!(value["content_type"], "binary");
    }

    #[test]
    fn failure_serializes_error_and_hints() {
        let env = ResponseEnvelope::failure("boom", ["first", "second"]);
        assert!(!env.is_success());
        assert_eq!(
            env.to_json(),
            json!({"success": false, "error": "boom", "troubleshooting": ["first", "second"]})
        );
    }

    #[test]
    fn degraded_json_is_detectable() {
        let env = success(Body::Text("{not json".to_string()), ContentKind::Json);
        assert!(env.as_success().unwrap().is_degraded());
        let env = success(Body::Json(json!(1)), ContentKind::Json);
        assert!(!env.as_success().unwrap().is_degraded());
    }
}
