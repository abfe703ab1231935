//! Hostname allowlist matching.
//!
//! # Design
//! Patterns are compiled once from configuration into `HostPattern` values
//! and never mutated afterwards. Matching works on the host string parsed
//! out of the URL, before any DNS lookup, so a denied host can never cause
//! network traffic.
//!
//! Two pattern shapes exist:
//! - a literal hostname or IP address, compared case-insensitively;
//! - `*.suffix`, which matches exactly one extra label in front of
//!   `suffix`. `*.hvs` matches `api.hvs` but neither `hvs` nor `a.b.hvs`.
//!
//! IP literals only ever match literal patterns.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::ConfigError;

/// A single compiled allowlist entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPattern {
    Exact(String),
    Wildcard { suffix: String },
}

impl HostPattern {
    /// Does this pattern admit `host`? `host` must already be normalized
    /// with [`normalize_host`].
    pub fn matches(&self, host: &str) -> bool {
        match self {
            HostPattern::Exact(name) => name == host,
            HostPattern::Wildcard { suffix } => {
                if host.parse::<IpAddr>().is_ok() {
                    return false;
                }
                let Some(label) = host
                    .strip_suffix(suffix.as_str())
                    .and_then(|rest| rest.strip_suffix('.'))
                else {
                    return false;
                };
                !label.is_empty() && !label.contains('.')
            }
        }
    }
}

impl FromStr for HostPattern {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| ConfigError::InvalidPattern {
            pattern: raw.to_string(),
            reason,
        };
        let pattern = normalize_host(raw.trim());
        if pattern.is_empty() {
            return Err(invalid("pattern is empty"));
        }
        if let Some(suffix) = pattern.strip_prefix("*.") {
            if suffix.is_empty() || suffix.contains('*') {
                return Err(invalid("wildcard needs a literal suffix, e.g. *.example"));
            }
            if suffix.starts_with('.') || suffix.ends_with('.') || suffix.contains("..") {
                return Err(invalid("suffix contains an empty label"));
            }
            return Ok(HostPattern::Wildcard {
                suffix: suffix.to_string(),
            });
        }
        if pattern.contains('*') {
            return Err(invalid("'*' is only allowed as a leading '*.' label"));
        }
        Ok(HostPattern::Exact(pattern))
    }
}

impl fmt::Display for HostPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostPattern::Exact(name) => f.write_str(name),
            HostPattern::Wildcard { suffix } => write!(f, "*.{suffix}"),
        }
    }
}

/// Lowercase a host, drop IPv6 brackets and a single trailing dot.
pub fn normalize_host(host: &str) -> String {
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    let host = host.strip_suffix('.').unwrap_or(host);
    host.to_ascii_lowercase()
}

/// The immutable set of permitted outbound hosts.
///
/// An empty allowlist denies everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Allowlist {
    patterns: Vec<HostPattern>,
}

impl Allowlist {
    pub fn new(patterns: Vec<HostPattern>) -> Self {
        Self { patterns }
    }

    /// Compile raw pattern strings, failing on the first malformed one.
    pub fn parse<I, S>(raw: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = raw
            .into_iter()
            .map(|p| p.as_ref().parse())
            .collect::<Result<Vec<HostPattern>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn patterns(&self) -> &[HostPattern] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Evaluate `host` and report which pattern let it through.
    pub fn check(&self, host: &str) -> AllowlistDecision {
        let normalized = normalize_host(host);
        match self.patterns.iter().find(|p| p.matches(&normalized)) {
            Some(pattern) => {
                tracing::debug!(host = %normalized, %pattern, "host matched allowlist");
                AllowlistDecision::Allowed {
                    host: normalized,
                    pattern: pattern.clone(),
                }
            }
            None => {
                tracing::warn!(host = %normalized, "host not in allowlist");
                AllowlistDecision::Denied { host: normalized }
            }
        }
    }

    pub fn is_allowed(&self, host: &str) -> bool {
        is_allowed(host, &self.patterns)
    }
}

/// Outcome of an allowlist check, handed from the matcher to the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowlistDecision {
    Allowed { host: String, pattern: HostPattern },
    Denied { host: String },
}

impl AllowlistDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AllowlistDecision::Allowed { .. })
    }

    pub fn host(&self) -> &str {
        match self {
            AllowlistDecision::Allowed { host, .. } | AllowlistDecision::Denied { host } => host,
        }
    }
}

/// Default-deny check of `hostname` against `patterns`.
pub fn is_allowed(hostname: &str, patterns: &[HostPattern]) -> bool {
    let host = normalize_host(hostname);
    !host.is_empty() && patterns.iter().any(|p| p.matches(&host))
}
