//! Inbound request validation.
//!
//! # Design
//! `RawRequest` is exactly what a caller may send: every field except `url`
//! is optional and nothing has been checked yet. `validate` turns it into a
//! `RequestDescription` whose invariants hold for the rest of the pipeline:
//! the URL is absolute http(s) with a host, the method is one of the seven
//! supported verbs, the timeout lies in `(0, ceiling]`, and every header is a
//! flat, wire-legal string pair.
//!
//! Out-of-range timeouts are rejected rather than clamped.
//!
//! A body sent with GET, HEAD, DELETE or OPTIONS passes validation but the
//! executor does not put it on the wire; only POST, PUT and PATCH transmit
//! a body.

use std::collections::BTreeMap;
use std::time::Duration;

use http::{HeaderName, HeaderValue};
use serde::Deserialize;
use url::Url;

use crate::allowlist::normalize_host;
use crate::config::Settings;
use crate::error::GatewayError;
use crate::http::HttpMethod;

/// A request exactly as the caller described it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRequest {
    pub url: String,
    pub method: Option<String>,
    /// Header values must be strings; anything else is rejected.
    pub headers: Option<BTreeMap<String, serde_json::Value>>,
    pub body: Option<String>,
    pub verify_ssl: Option<bool>,
    /// Seconds.
    pub timeout: Option<f64>,
    pub follow_redirects: Option<bool>,
}

impl RawRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// A validated request, ready for the allowlist check and dispatch.
#[derive(Debug, Clone)]
pub struct RequestDescription {
    pub url: Url,
    /// Normalized host taken from `url`.
    pub host: String,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub verify_ssl: bool,
    pub timeout: Duration,
    pub follow_redirects: bool,
}

impl RequestDescription {
    /// The bytes to send, if this method sends a body at all.
    pub fn payload(&self) -> Option<&[u8]> {
        self.body
            .as_deref()
            .filter(|_| self.method.carries_payload())
            .map(str::as_bytes)
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

/// Parse and bound-check `raw` against `settings`.
///
/// Per-host defaults from `settings.hosts` fill in the timeout and SSL flag
/// the caller left out, and add injected headers the caller did not set.
pub fn validate(raw: RawRequest, settings: &Settings) -> Result<RequestDescription, GatewayError> {
    let limits = &settings.limits;
    let url = parse_url(&raw.url)?;
    let host = url
        .host_str()
        .map(normalize_host)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| GatewayError::InvalidUrl {
            url: raw.url.clone(),
            reason: "URL has no host",
        })?;

    let method = match raw.method.as_deref() {
        None => HttpMethod::Get,
        Some(m) => m.parse().map_err(|()| GatewayError::InvalidMethod {
            method: m.to_string(),
        })?,
    };

    let policy = settings.host_policy(&host);

    let timeout_secs = raw
        .timeout
        .or_else(|| policy.and_then(|p| p.timeout_secs))
        .unwrap_or(limits.default_timeout_secs);
    if !(timeout_secs.is_finite() && timeout_secs > 0.0 && timeout_secs <= limits.max_timeout_secs) {
        return Err(GatewayError::TimeoutOutOfRange {
            requested: timeout_secs,
            ceiling: limits.max_timeout_secs,
        });
    }

    let timeout = Duration::try_from_secs_f64(timeout_secs).map_err(|_| GatewayError::TimeoutOutOfRange {
        requested: timeout_secs,
        ceiling: limits.max_timeout_secs,
    })?;

    let verify_ssl = raw
        .verify_ssl
        .or_else(|| policy.and_then(|p| p.verify_ssl))
        .unwrap_or(true);

    let headers = match raw.headers {
        Some(map) => validate_headers(map)?,
        None => Vec::new(),
    };

    if raw.body.is_some() && !method.carries_payload() {
        tracing::warn!(%method, %host, "request body supplied with a method that does not send one; it will not be transmitted");
    }

    let mut request = RequestDescription {
        url,
        host,
        method,
        headers,
        body: raw.body,
        verify_ssl,
        timeout,
        follow_redirects: raw.follow_redirects.unwrap_or(true),
    };

    if let Some(policy) = policy {
        for (name, value) in &policy.headers {
            if !request.has_header(name) {
                request.headers.push((name.clone(), value.clone()));
            }
        }
        if let Some(token) = &policy.bearer_token {
            if !request.has_header("authorization") {
                request.headers.push(("authorization".to_string(), token.header_value()));
            }
        }
    }

    Ok(request)
}

fn parse_url(raw: &str) -> Result<Url, GatewayError> {
    let invalid = |reason| GatewayError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw.trim()).map_err(|_| invalid("URL is not absolute or is malformed"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("URL must start with http:// or https://"));
    }
    Ok(url)
}

fn validate_headers(
    map: BTreeMap<String, serde_json::Value>,
) -> Result<Vec<(String, String)>, GatewayError> {
    map.into_iter()
        .map(|(name, value)| {
            let serde_json::Value::String(value) = value else {
                return Err(GatewayError::InvalidHeader {
                    name,
                    reason: "header values must be plain strings",
                });
            };
            if HeaderName::from_bytes(name.as_bytes()).is_err() {
                return Err(GatewayError::InvalidHeader {
                    name,
                    reason: "not a valid header name",
                });
            }
            if HeaderValue::from_str(&value).is_err() {
                return Err(GatewayError::InvalidHeader {
                    name,
                    reason: "value contains characters not allowed in a header",
                });
            }
            Ok((name, value))
        })
        .collect()
}
