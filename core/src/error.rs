//! Error taxonomy for the egress gateway.
//!
//! # Design
//! Every failure a call can hit is a `GatewayError` variant, and every
//! variant maps to one stable `ErrorKind`. Validation and allowlist
//! variants are produced before any socket is opened; the remaining
//! network variants come out of the executor boundary.
//!
//! Variants that wrap a lower-level failure keep it in a `detail` field that
//! `Display` never prints. The envelope shown to callers is built from
//! `Display` alone, so raw library messages stay in the logs.

use std::time::Duration;

use thiserror::Error;

/// Stable classification of a `GatewayError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidRequest,
    InvalidUrl,
    InvalidMethod,
    TimeoutOutOfRange,
    InvalidHeader,
    AllowlistDenied,
    ConnectionFailed,
    TlsFailed,
    TimedOut,
    RedirectExceeded,
    ResponseTooLarge,
    Internal,
}

impl ErrorKind {
    /// True for kinds raised before the network is touched.
    pub fn is_pre_dispatch(self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidRequest
                | ErrorKind::InvalidUrl
                | ErrorKind::InvalidMethod
                | ErrorKind::TimeoutOutOfRange
                | ErrorKind::InvalidHeader
                | ErrorKind::AllowlistDenied
        )
    }
}

/// Any failure of a single gateway call.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The payload could not be read as a request description at all.
    /// `detail` keeps the parser's message for the logs.
    #[error("invalid request parameters: {reason}")]
    InvalidRequest {
        reason: &'static str,
        detail: Option<String>,
    },

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: &'static str },

    #[error("invalid HTTP method '{method}': must be one of GET, POST, PUT, PATCH, DELETE, HEAD, OPTIONS")]
    InvalidMethod { method: String },

    #[error("timeout must be greater than 0 and at most {ceiling} seconds, got {requested}")]
    TimeoutOutOfRange { requested: f64, ceiling: f64 },

    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: &'static str },

    #[error("domain '{host}' is not in the allowlist")]
    AllowlistDenied { host: String },

    #[error("could not connect to '{host}'")]
    ConnectionFailed { host: String, detail: String },

    #[error("TLS handshake with '{host}' failed")]
    TlsFailed { host: String, detail: String },

    #[error("request timed out after {} seconds", .after.as_secs_f64())]
    TimedOut { after: Duration },

    #[error("too many redirects (max: {max}), last URL: {last_url}")]
    RedirectExceeded { max: u32, last_url: String },

    #[error("response too large: exceeded {limit} bytes")]
    ResponseTooLarge { limit: usize },

    #[error("internal gateway failure")]
    Internal { detail: String },
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            GatewayError::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            GatewayError::InvalidMethod { .. } => ErrorKind::InvalidMethod,
            GatewayError::TimeoutOutOfRange { .. } => ErrorKind::TimeoutOutOfRange,
            GatewayError::InvalidHeader { .. } => ErrorKind::InvalidHeader,
            GatewayError::AllowlistDenied { .. } => ErrorKind::AllowlistDenied,
            GatewayError::ConnectionFailed { .. } => ErrorKind::ConnectionFailed,
            GatewayError::TlsFailed { .. } => ErrorKind::TlsFailed,
            GatewayError::TimedOut { .. } => ErrorKind::TimedOut,
            GatewayError::RedirectExceeded { .. } => ErrorKind::RedirectExceeded,
            GatewayError::ResponseTooLarge { .. } => ErrorKind::ResponseTooLarge,
            GatewayError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Internal diagnostic text, for logs only.
    pub fn detail(&self) -> Option<&str> {
        match self {
            GatewayError::ConnectionFailed { detail, .. }
            | GatewayError::TlsFailed { detail, .. }
            | GatewayError::Internal { detail } => Some(detail),
            GatewayError::InvalidRequest {
                detail: Some(detail), ..
            } => Some(detail.as_str()),
            _ => None,
        }
    }
}

/// Failures while loading or compiling the gateway configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid allowlist pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: &'static str },

    #[error("invalid limit '{field}': {reason}")]
    InvalidLimit { field: &'static str, reason: &'static str },

    #[error("invalid injected header '{name}' for host '{host}'")]
    InvalidHostHeader { host: String, name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_omits_internal_detail() {
        let err = GatewayError::ConnectionFailed {
            host: "api.hvs".to_string(),
            detail: "tcp connect error: Connection refused (os error 111)".to_string(),
        };
        let shown = err.to_string();
        assert_eq!(shown, "could not connect to 'api.hvs'");
        assert!(!shown.contains("os error"));
        assert_eq!(err.detail(), Some("tcp connect error: Connection refused (os error 111)"));
    }

    #[test]
    fn timed_out_reports_seconds() {
        let err = GatewayError::TimedOut {
            after: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "request timed out after 1.5 seconds");
        assert_eq!(err.kind(), ErrorKind::TimedOut);
    }

    #[test]
    fn pre_dispatch_kinds() {
        assert!(ErrorKind::AllowlistDenied.is_pre_dispatch());
        assert!(ErrorKind::TimeoutOutOfRange.is_pre_dispatch());
        assert!(!ErrorKind::ConnectionFailed.is_pre_dispatch());
        assert!(!ErrorKind::ResponseTooLarge.is_pre_dispatch());
    }

    #[test]
    fn allowlist_denial_names_host() {
        let err = GatewayError::AllowlistDenied {
            host: "denied.example".to_string(),
        };
        assert!(err.to_string().contains("denied.example"));
        assert!(err.to_string().contains("not in the allowlist"));
    }
}
