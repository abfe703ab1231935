//! Gateway configuration.
//!
//! # Design
//! `GatewayConfig` is the serde view of the JSON config document; every
//! field has a default so an empty `{}` is valid (and denies every host).
//! `GatewayConfig::build` validates the document once and produces
//! `Settings`, the immutable value every call reads through an `Arc`.
//! Nothing in `Settings` changes while the gateway runs; a new allowlist
//! means building new `Settings` and a new `Gateway`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::Path;

use http::{HeaderName, HeaderValue};
use serde::Deserialize;

use crate::allowlist::{normalize_host, Allowlist};
use crate::error::ConfigError;

/// Environment variable that replaces `allowed_domains` (comma-separated).
pub const ALLOWED_DOMAINS_ENV: &str = "EGRESS_ALLOWED_DOMAINS";

pub const DEFAULT_TIMEOUT_SECS: f64 = 30.0;
pub const MAX_TIMEOUT_SECS: f64 = 300.0;
/// Upper bound for a configured `max_timeout_secs`: one day.
pub const TIMEOUT_CEILING_LIMIT_SECS: f64 = 86_400.0;
pub const MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_REDIRECTS: u32 = 5;

/// What to do with a body that hits `max_response_bytes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OversizePolicy {
    /// Deliver the first `max_response_bytes` bytes and flag `truncated`.
    #[default]
    Truncate,
    /// Fail the call with `ResponseTooLarge`.
    Reject,
}

/// Deserialized configuration document.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    pub allowed_domains: Vec<String>,
    pub default_timeout_secs: f64,
    pub max_timeout_secs: f64,
    pub max_response_bytes: usize,
    pub max_redirects: u32,
    pub oversize: OversizePolicy,
    pub recheck_redirects: bool,
    pub redact_headers: Vec<String>,
    pub redact_json_keys: Vec<String>,
    pub hosts: BTreeMap<String, HostPolicyConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            allowed_domains: Vec::new(),
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_timeout_secs: MAX_TIMEOUT_SECS,
            max_response_bytes: MAX_RESPONSE_BYTES,
            max_redirects: MAX_REDIRECTS,
            oversize: OversizePolicy::Truncate,
            recheck_redirects: true,
            redact_headers: Vec::new(),
            redact_json_keys: Vec::new(),
            hosts: BTreeMap::new(),
        }
    }
}

/// Per-host defaults, keyed by exact hostname in `GatewayConfig::hosts`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostPolicyConfig {
    /// Used when the caller does not pass a timeout.
    pub timeout_secs: Option<f64>,
    /// Used when the caller does not pass `verify_ssl`.
    pub verify_ssl: Option<bool>,
    /// Added unless the caller already set a header of the same name.
    pub headers: BTreeMap<String, String>,
    /// Environment variable holding a bearer token for this host.
    pub bearer_token_env: Option<String>,
}

impl GatewayConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Apply `EGRESS_ALLOWED_DOMAINS` from the process environment.
    pub fn with_env_overrides(mut self) -> Self {
        self.override_allowed_domains(std::env::var(ALLOWED_DOMAINS_ENV).ok().as_deref());
        self
    }

    /// Replace the allowlist with a comma-separated list. Blank input keeps
    /// the configured list.
    pub fn override_allowed_domains(&mut self, raw: Option<&str>) {
        let Some(raw) = raw else { return };
        let domains: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if !domains.is_empty() {
            self.allowed_domains = domains;
        }
    }

    /// Validate the document and resolve bearer tokens from the environment.
    pub fn build(&self) -> Result<Settings, ConfigError> {
        self.build_with_env(|name| std::env::var(name).ok())
    }

    /// Like [`build`](Self::build) with an explicit environment lookup.
    pub fn build_with_env<F>(&self, env: F) -> Result<Settings, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let allowlist = Allowlist::parse(&self.allowed_domains)?;
        let limits = self.limits()?;

        let mut hosts = HashMap::with_capacity(self.hosts.len());
        for (host, policy) in &self.hosts {
            let host = normalize_host(host);
            if let Some(timeout) = policy.timeout_secs {
                check_timeout("hosts.timeout_secs", timeout, limits.max_timeout_secs)?;
            }
            let mut headers = Vec::with_capacity(policy.headers.len());
            for (name, value) in &policy.headers {
                if HeaderName::from_bytes(name.as_bytes()).is_err()
                    || HeaderValue::from_str(value).is_err()
                {
                    return Err(ConfigError::InvalidHostHeader {
                        host,
                        name: name.clone(),
                    });
                }
                headers.push((name.to_ascii_lowercase(), value.clone()));
            }
            let bearer_token = match &policy.bearer_token_env {
                Some(var) => {
                    let token = env(var).filter(|t| !t.trim().is_empty());
                    if token.is_none() {
                        tracing::warn!(%host, env = %var, "bearer token variable is unset, no token will be injected");
                    }
                    token.map(BearerToken)
                }
                None => None,
            };
            hosts.insert(
                host,
                HostPolicy {
                    timeout_secs: policy.timeout_secs,
                    verify_ssl: policy.verify_ssl,
                    headers,
                    bearer_token,
                },
            );
        }

        let mut redacted_headers: BTreeSet<String> = DEFAULT_REDACTED_HEADERS
            .iter()
            .map(|h| h.to_string())
            .collect();
        redacted_headers.extend(self.redact_headers.iter().map(|h| h.trim().to_ascii_lowercase()));
        let redacted_json_keys = self
            .redact_json_keys
            .iter()
            .map(|k| k.to_ascii_lowercase())
            .collect();

        tracing::info!(
            patterns = allowlist.patterns().len(),
            max_response_bytes = limits.max_response_bytes,
            max_redirects = limits.max_redirects,
            "gateway settings built"
        );

        Ok(Settings {
            allowlist,
            limits,
            redaction: Redaction {
                headers: redacted_headers,
                json_keys: redacted_json_keys,
            },
            hosts,
        })
    }

    fn limits(&self) -> Result<Limits, ConfigError> {
        if !(self.max_timeout_secs.is_finite() && self.max_timeout_secs > 0.0) {
            return Err(ConfigError::InvalidLimit {
                field: "max_timeout_secs",
                reason: "must be a positive number",
            });
        }
        if self.max_timeout_secs > TIMEOUT_CEILING_LIMIT_SECS {
            return Err(ConfigError::InvalidLimit {
                field: "max_timeout_secs",
                reason: "must be at most 86400 seconds",
            });
        }
        check_timeout("default_timeout_secs", self.default_timeout_secs, self.max_timeout_secs)?;
        if self.max_response_bytes == 0 {
            return Err(ConfigError::InvalidLimit {
                field: "max_response_bytes",
                reason: "must be at least 1",
            });
        }
        Ok(Limits {
            default_timeout_secs: self.default_timeout_secs,
            max_timeout_secs: self.max_timeout_secs,
            max_response_bytes: self.max_response_bytes,
            max_redirects: self.max_redirects,
            oversize: self.oversize,
            recheck_redirects: self.recheck_redirects,
        })
    }
}

fn check_timeout(field: &'static str, secs: f64, ceiling: f64) -> Result<(), ConfigError> {
    if secs.is_finite() && secs > 0.0 && secs <= ceiling {
        Ok(())
    } else {
        Err(ConfigError::InvalidLimit {
            field,
            reason: "must be greater than 0 and at most max_timeout_secs",
        })
    }
}

/// Response headers that are always redacted.
pub const DEFAULT_REDACTED_HEADERS: &[&str] = &["set-cookie", "cookie"];

/// Numeric bounds applied to every call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    pub default_timeout_secs: f64,
    pub max_timeout_secs: f64,
    pub max_response_bytes: usize,
    pub max_redirects: u32,
    pub oversize: OversizePolicy,
    pub recheck_redirects: bool,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_timeout_secs: MAX_TIMEOUT_SECS,
            max_response_bytes: MAX_RESPONSE_BYTES,
            max_redirects: MAX_REDIRECTS,
            oversize: OversizePolicy::Truncate,
            recheck_redirects: true,
        }
    }
}

/// Lowercased names of headers and JSON keys to replace with a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redaction {
    pub headers: BTreeSet<String>,
    pub json_keys: BTreeSet<String>,
}

impl Default for Redaction {
    fn default() -> Self {
        Self {
            headers: DEFAULT_REDACTED_HEADERS.iter().map(|h| h.to_string()).collect(),
            json_keys: BTreeSet::new(),
        }
    }
}

/// Token injected as `Authorization: Bearer ...`. Never printed.
pub struct BearerToken(String);

impl BearerToken {
    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Compiled per-host defaults.
#[derive(Debug)]
pub struct HostPolicy {
    pub timeout_secs: Option<f64>,
    pub verify_ssl: Option<bool>,
    pub headers: Vec<(String, String)>,
    pub bearer_token: Option<BearerToken>,
}

/// Immutable, validated gateway settings.
#[derive(Debug, Default)]
pub struct Settings {
    pub allowlist: Allowlist,
    pub limits: Limits,
    pub redaction: Redaction,
    pub hosts: HashMap<String, HostPolicy>,
}

impl Settings {
    /// Settings with default limits and the given allowlist.
    pub fn with_allowlist(allowlist: Allowlist) -> Self {
        Self {
            allowlist,
            ..Self::default()
        }
    }

    pub fn host_policy(&self, host: &str) -> Option<&HostPolicy> {
        self.hosts.get(&normalize_host(host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = GatewayConfig::from_json_str("{}").unwrap();
        let settings = config.build_with_env(|_| None).unwrap();
        assert!(settings.allowlist.is_empty());
        assert_eq!(settings.limits, Limits::default());
        assert!(settings.redaction.headers.contains("set-cookie"));
        assert!(settings.redaction.headers.contains("cookie"));
    }

    #[test]
    fn full_document_parses() {
        let raw = r#"{
            "allowed_domains": ["apex-demo.hvs", "*.hvs", "localhost"],
            "default_timeout_secs": 10,
            "max_timeout_secs": 120,
            "max_response_bytes": 1024,
            "max_redirects": 3,
            "oversize": "reject",
            "recheck_redirects": false,
            "redact_headers": ["X-Api-Key"],
            "redact_json_keys": ["Password"],
            "hosts": {
                "Slow-Api.hvs": {"timeout_secs": 90, "verify_ssl": false, "headers": {"X-Client": "egress"}}
            }
        }"#;
        let settings = GatewayConfig::from_json_str(raw)
            .unwrap()
            .build_with_env(|_| None)
            .unwrap();
        assert!(settings.allowlist.is_allowed("api.hvs"));
        assert_eq!(settings.limits.max_redirects, 3);
        assert_eq!(settings.limits.oversize, OversizePolicy::Reject);
        assert!(!settings.limits.recheck_redirects);
        assert!(settings.redaction.headers.contains("x-api-key"));
        assert!(settings.redaction.json_keys.contains("password"));

        let policy = settings.host_policy("slow-api.hvs").unwrap();
        assert_eq!(policy.timeout_secs, Some(90.0));
        assert_eq!(policy.verify_ssl, Some(false));
        assert_eq!(policy.headers, vec![("x-client".to_string(), "egress".to_string())]);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = GatewayConfig::from_json_str(r#"{"allowed_hosts": []}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn bad_pattern_fails_build() {
        let config = GatewayConfig {
            allowed_domains: vec!["a.*.hvs".to_string()],
            ..GatewayConfig::default()
        };
        let err = config.build_with_env(|_| None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn default_timeout_must_fit_ceiling() {
        let config = GatewayConfig {
            default_timeout_secs: 600.0,
            ..GatewayConfig::default()
        };
        let err = config.build_with_env(|_| None).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidLimit {
                field: "default_timeout_secs",
                ..
            }
        ));
    }

    #[test]
    fn huge_timeout_ceiling_is_rejected() {
        for ceiling in ["1e20", "86400.5", "1e308"] {
            let config = GatewayConfig::from_json_str(&format!(r#"{{"max_timeout_secs": {ceiling}}}"#)).unwrap();
            let err = config.build_with_env(|_| None).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidLimit { field: "max_timeout_secs", .. }),
                "{ceiling}: {err}"
            );
        }
        let config = GatewayConfig::from_json_str(r#"{"max_timeout_secs": 86400}"#).unwrap();
        assert!(config.build_with_env(|_| None).is_ok());
    }

    #[test]
    fn zero_response_cap_is_rejected() {
        let config = GatewayConfig {
            max_response_bytes: 0,
            ..GatewayConfig::default()
        };
        assert!(config.build_with_env(|_| None).is_err());
    }

    #[test]
    fn env_override_replaces_allowlist() {
        let mut config = GatewayConfig {
            allowed_domains: vec!["localhost".to_string()],
            ..GatewayConfig::default()
        };
        config.override_allowed_domains(Some(" *.hvs , api.internal ,,"));
        assert_eq!(config.allowed_domains, vec!["*.hvs", "api.internal"]);

        config.override_allowed_domains(Some("  "));
        assert_eq!(config.allowed_domains, vec!["*.hvs", "api.internal"]);

        config.override_allowed_domains(None);
        assert_eq!(config.allowed_domains, vec!["*.hvs", "api.internal"]);
    }

    #[test]
    fn bearer_token_is_read_from_env_and_hidden() {
        let raw = r#"{"hosts": {"api.hvs": {"bearer_token_env": "API_HVS_TOKEN"}}}"#;
        let settings = GatewayConfig::from_json_str(raw)
            .unwrap()
            .build_with_env(|name| (name == "API_HVS_TOKEN").then(|| "s3cr3t".to_string()))
            .unwrap();
        let token = settings.host_policy("api.hvs").unwrap().bearer_token.as_ref().unwrap();
        assert_eq!(token.header_value(), "Bearer s3cr3t");
        assert!(!format!("{settings:?}").contains("s3cr3t"));
    }

    #[test]
    fn missing_bearer_env_injects_nothing() {
        let raw = r#"{"hosts": {"api.hvs": {"bearer_token_env": "UNSET_TOKEN"}}}"#;
        let settings = GatewayConfig::from_json_str(raw)
            .unwrap()
            .build_with_env(|_| None)
            .unwrap();
        assert!(settings.host_policy("api.hvs").unwrap().bearer_token.is_none());
    }

    #[test]
    fn invalid_injected_header_is_rejected() {
        let raw = r#"{"hosts": {"api.hvs": {"headers": {"bad header": "x"}}}}"#;
        let err = GatewayConfig::from_json_str(raw)
            .unwrap()
            .build_with_env(|_| None)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidHostHeader { .. }));
    }

    #[test]
    fn missing_config_file_reports_path() {
        let err = GatewayConfig::from_path("/nonexistent/egress.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/egress.json"));
    }
}
