//! Failure envelopes with remediation hints.
//!
//! Messages come from `GatewayError`'s `Display`, which never includes the
//! wrapped library error. Each kind carries between two and four hints, in
//! the order a caller should try them.

use crate::envelope::ResponseEnvelope;
use crate::error::{ErrorKind, GatewayError};

/// Convert any gateway failure into the failure envelope.
pub fn to_envelope(err: &GatewayError) -> ResponseEnvelope {
    let kind = err.kind();
    match err.detail() {
        Some(detail) if kind == ErrorKind::Internal => {
            tracing::error!(?kind, %detail, "gateway call failed");
        }
        Some(detail) => tracing::warn!(?kind, %detail, "gateway call failed"),
        None => tracing::warn!(?kind, error = %err, "gateway call failed"),
    }
    ResponseEnvelope::failure(err.to_string(), troubleshooting(err))
}

/// Ordered remediation steps for `err`.
pub fn troubleshooting(err: &GatewayError) -> Vec<String> {
    match err {
        GatewayError::InvalidRequest { .. } => vec![
            "Check that all parameters are correctly formatted".to_string(),
            "Provide at least a 'url' field".to_string(),
            "Send the request as a JSON object".to_string(),
        ],
        GatewayError::InvalidUrl { .. } => vec![
            "Ensure the URL starts with http:// or https://".to_string(),
            "Include a hostname, e.g. https://api.example/path".to_string(),
            "Percent-encode spaces and special characters".to_string(),
        ],
        GatewayError::InvalidMethod { .. } => vec![
            "Use one of GET, POST, PUT, PATCH, DELETE, HEAD, OPTIONS".to_string(),
            "Check the method name for typos".to_string(),
        ],
        GatewayError::TimeoutOutOfRange { ceiling, .. } => vec![
            format!("Pass a timeout greater than 0 and at most {ceiling} seconds"),
            "Omit the timeout to use the gateway default".to_string(),
        ],
        GatewayError::InvalidHeader { .. } => vec![
            "Pass header values as plain strings, not objects, arrays or numbers".to_string(),
            "Remove line breaks and control characters from header values".to_string(),
            "Check header names for spaces or separators".to_string(),
        ],
        GatewayError::AllowlistDenied { host } => vec![
            format!("Add '{host}' to allowed_domains in the gateway configuration"),
            "Restart the gateway after changing the configuration".to_string(),
            "Check that the domain is spelled correctly".to_string(),
        ],
        GatewayError::ConnectionFailed { .. } => vec![
            "Verify the URL is correct".to_string(),
            "Check that the server is running".to_string(),
            "Ensure the domain resolves correctly (check /etc/hosts)".to_string(),
            "Verify firewall settings allow the connection".to_string(),
        ],
        GatewayError::TlsFailed { .. } => vec![
            "Check that the server certificate is valid and matches the hostname".to_string(),
            "For self-signed development certificates, set verify_ssl to false".to_string(),
            "Use http:// if the server does not speak TLS".to_string(),
        ],
        GatewayError::TimedOut { .. } => vec![
            "Increase the timeout parameter in the request".to_string(),
            "Check if the server is responding".to_string(),
            "Verify network connectivity to the host".to_string(),
        ],
        GatewayError::RedirectExceeded { .. } => vec![
            "Check for redirect loops on the server".to_string(),
            "Increase max_redirects in the gateway configuration if the chain is expected".to_string(),
            "Set follow_redirects to false to see the redirect response".to_string(),
        ],
        GatewayError::ResponseTooLarge { .. } => vec![
            "Increase max_response_bytes in the gateway configuration".to_string(),
            "Use pagination or filtering to reduce the response size".to_string(),
            "Set oversize to \"truncate\" to receive the first part of the body".to_string(),
        ],
        GatewayError::Internal { .. } => vec![
            "Check the gateway logs for more details".to_string(),
            "Retry the request".to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn all_errors() -> Vec<GatewayError> {
        vec![
            GatewayError::InvalidRequest {
                reason: "request must be a JSON object with a string 'url'",
                detail: Some("missing field `url` at line 1 column 2".to_string()),
            },
            GatewayError::InvalidUrl {
                url: "ftp://x".to_string(),
                reason: "URL must start with http:// or https://",
            },
            GatewayError::InvalidMethod {
                method: "TRACE".to_string(),
            },
            GatewayError::TimeoutOutOfRange {
                requested: 0.0,
                ceiling: 300.0,
            },
            GatewayError::InvalidHeader {
                name: "X".to_string(),
                reason: "header values must be plain strings",
            },
            GatewayError::AllowlistDenied {
                host: "denied.example".to_string(),
            },
            GatewayError::ConnectionFailed {
                host: "api.hvs".to_string(),
                detail: "dns error: failed to lookup address information".to_string(),
            },
            GatewayError::TlsFailed {
                host: "api.hvs".to_string(),
                detail: "invalid peer certificate: UnknownIssuer".to_string(),
            },
            GatewayError::TimedOut {
                after: Duration::from_secs(30),
            },
            GatewayError::RedirectExceeded {
                max: 5,
                last_url: "https://api.hvs/loop".to_string(),
            },
            GatewayError::ResponseTooLarge { limit: 1024 },
            GatewayError::Internal {
                detail: "worker panicked".to_string(),
            },
        ]
    }

    #[test]
    fn every_kind_has_two_to_four_hints() {
        for err in all_errors() {
            let hints = troubleshooting(&err);
            assert!(
                (2..=4).contains(&hints.len()),
                "{:?} has {} hints",
                err.kind(),
                hints.len()
            );
        }
    }

    #[test]
    fn envelopes_never_carry_internal_detail() {
        for err in all_errors() {
            let env = to_envelope(&err);
            let failure = env.as_failure().unwrap();
            if let Some(detail) = err.detail() {
                assert!(!failure.error.contains(detail), "{:?} leaked detail", err.kind());
                assert!(failure.troubleshooting.iter().all(|h| !h.contains(detail)));
            }
        }
    }

    #[test]
    fn allowlist_denial_envelope() {
        let env = to_envelope(&GatewayError::AllowlistDenied {
            host: "denied.example".to_string(),
        });
        let failure = env.as_failure().unwrap();
        assert!(failure.error.contains("not in the allowlist"));
        assert!(failure.troubleshooting[0].contains("denied.example"));
        assert!(failure.troubleshooting.iter().any(|h| h.contains("Restart")));
    }

    #[test]
    fn redirect_envelope_names_last_url() {
        let env = to_envelope(&GatewayError::RedirectExceeded {
            max: 5,
            last_url: "https://api.hvs/loop".to_string(),
        });
        let failure = env.as_failure().unwrap();
        assert!(failure.error.contains("max: 5"));
        assert!(failure.error.contains("https://api.hvs/loop"));
    }
}
