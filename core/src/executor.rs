//! Bounded outbound execution.
//!
//! # Design
//! `HttpExecutor` owns the policy of a call: allowlist gate, redirect
//! chain, overall deadline, byte cap and elapsed-time measurement. The
//! wire work is delegated to a `Transport`, which sends exactly one request
//! and never follows redirects on its own. That split keeps every redirect
//! hop visible here, so each hop is re-checked against the allowlist, and
//! lets tests swap in a transport that records dispatches.
//!
//! Per call:
//!
//! ```text
//! Received -> AllowlistChecked -> Dispatching -> StreamingBody
//!     -> Completed | TimedOut | TooLarge | RedirectExceeded
//!      | ConnectionFailed | TLSFailed
//! ```
//!
//! One deadline covers every hop and the body read. Each hop is handed only
//! what is left of it.

use std::io::{self, Read};
use std::time::{Duration, Instant};

use thiserror::Error;
use url::Url;

use crate::allowlist::{normalize_host, AllowlistDecision};
use crate::config::{OversizePolicy, Settings};
use crate::error::GatewayError;
use crate::http::{ExecutionResult, HttpMethod};
use crate::request::RequestDescription;

const READ_CHUNK: usize = 16 * 1024;

/// One request on the wire.
#[derive(Debug)]
pub struct Hop<'a> {
    pub method: HttpMethod,
    pub url: &'a Url,
    pub headers: &'a [(String, String)],
    pub body: Option<&'a [u8]>,
    pub verify_ssl: bool,
    /// Time left in the call's budget.
    pub timeout: Duration,
}

/// Status line and headers of a response whose body is still unread.
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Box<dyn Read>,
}

/// Transport-level failure classes.
#[derive(Debug, Error)]
pub enum TransportError {
    /// DNS failure, refused or reset connection, protocol breakage.
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("TLS failure: {0}")]
    Tls(String),
    #[error("timed out")]
    Timeout,
}

/// Sends a single HTTP request. Must not follow redirects.
pub trait Transport: Send + Sync {
    fn send(&self, hop: &Hop<'_>) -> Result<RawResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, hop: &Hop<'_>) -> Result<RawResponse, TransportError> {
        (**self).send(hop)
    }
}

/// Runs validated requests through a `Transport` under the gateway limits.
#[derive(Debug, Clone, Default)]
pub struct HttpExecutor<T> {
    transport: T,
}

impl<T: Transport> HttpExecutor<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Execute `request`, which `decision` must have cleared.
    ///
    /// A denied decision returns `AllowlistDenied` without calling the
    /// transport.
    pub fn execute(
        &self,
        request: &RequestDescription,
        decision: &AllowlistDecision,
        settings: &Settings,
    ) -> Result<ExecutionResult, GatewayError> {
        if let AllowlistDecision::Denied { host } = decision {
            return Err(GatewayError::AllowlistDenied { host: host.clone() });
        }
        let limits = &settings.limits;

        let started = Instant::now();
        let deadline = started
            .checked_add(request.timeout)
            .ok_or_else(|| GatewayError::TimeoutOutOfRange {
                requested: request.timeout.as_secs_f64(),
                ceiling: limits.max_timeout_secs,
            })?;
        let timed_out = || GatewayError::TimedOut {
            after: request.timeout,
        };

        let mut url = request.url.clone();
        let mut method = request.method;
        let mut headers = request.headers.clone();
        let mut body = request.payload().map(<[u8]>::to_vec);
        let mut redirects = 0u32;

        loop {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .filter(|d| !d.is_zero())
                .ok_or_else(timed_out)?;
            let hop_host = url.host_str().map(normalize_host).unwrap_or_default();

            tracing::info!(
                %method,
                url = %url,
                headers = ?redacted_for_log(&headers),
                body_bytes = body.as_ref().map_or(0, Vec::len),
                hop = redirects,
                "dispatching outbound request"
            );
            let hop = Hop {
                method,
                url: &url,
                headers: &headers,
                body: body.as_deref(),
                verify_ssl: request.verify_ssl,
                timeout: remaining,
            };
            let response = self
                .transport
                .send(&hop)
                .map_err(|err| classify_transport(err, &hop_host, request.timeout))?;

            let location = request
                .follow_redirects
                .then(|| redirect_target(&url, &response))
                .flatten();
            if let Some(next) = location {
                if redirects >= limits.max_redirects {
                    tracing::warn!(max = limits.max_redirects, last_url = %url, "redirect limit exceeded");
                    return Err(GatewayError::RedirectExceeded {
                        max: limits.max_redirects,
                        last_url: url.to_string(),
                    });
                }
                let next_host = next.host_str().map(normalize_host).unwrap_or_default();
                if limits.recheck_redirects {
                    if let AllowlistDecision::Denied { host } = settings.allowlist.check(&next_host) {
                        return Err(GatewayError::AllowlistDenied { host });
                    }
                }
                if next_host != hop_host || is_https_downgrade(&url, &next) {
                    headers.retain(|(k, _)| {
                        !k.eq_ignore_ascii_case("authorization") && !k.eq_ignore_ascii_case("cookie")
                    });
                }
                if switches_to_get(response.status, method) {
                    method = HttpMethod::Get;
                    body = None;
                    headers.retain(|(k, _)| {
                        !k.eq_ignore_ascii_case("content-type") && !k.eq_ignore_ascii_case("content-length")
                    });
                }
                tracing::debug!(status = response.status, from = %url, to = %next, "following redirect");
                redirects += 1;
                url = next;
                continue;
            }

            let RawResponse {
                status,
                headers: response_headers,
                body: mut stream,
            } = response;
            let (bytes, truncated) = read_capped(&mut stream, limits.max_response_bytes)
                .map_err(|err| classify_read(&err, &hop_host, request.timeout))?;
            let elapsed = started.elapsed();
            if elapsed > request.timeout {
                return Err(timed_out());
            }
            if truncated && limits.oversize == OversizePolicy::Reject {
                tracing::warn!(limit = limits.max_response_bytes, url = %url, "response exceeded size cap");
                return Err(GatewayError::ResponseTooLarge {
                    limit: limits.max_response_bytes,
                });
            }

            tracing::info!(
                status,
                bytes = bytes.len(),
                truncated,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                url = %url,
                "outbound request completed"
            );
            return Ok(ExecutionResult {
                status,
                headers: response_headers,
                body: bytes,
                final_url: url,
                elapsed,
                truncated,
            });
        }
    }
}

/// Resolve the `Location` of a redirect response. A missing, malformed or
/// non-http(s) target ends the chain.
fn redirect_target(current: &Url, response: &RawResponse) -> Option<Url> {
    if !matches!(response.status, 301 | 302 | 303 | 307 | 308) {
        return None;
    }
    let location = response
        .headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("location"))
        .map(|(_, v)| v.as_str())?;
    let next = current.join(location).ok()?;
    match next.scheme() {
        "http" | "https" if next.host_str().is_some_and(|h| !h.is_empty()) => Some(next),
        _ => None,
    }
}

fn is_https_downgrade(from: &Url, to: &Url) -> bool {
    from.scheme() == "https" && to.scheme() == "http"
}

fn switches_to_get(status: u16, method: HttpMethod) -> bool {
    match status {
        303 => method != HttpMethod::Head,
        301 | 302 => method == HttpMethod::Post,
        _ => false,
    }
}

/// Read at most `cap` bytes. The flag reports whether the stream had more.
///
/// The cap is enforced on the bytes actually read, so a lying
/// `Content-Length` makes no difference.
fn read_capped(reader: &mut dyn Read, cap: usize) -> io::Result<(Vec<u8>, bool)> {
    let mut buf = Vec::with_capacity(cap.min(READ_CHUNK));
    let mut chunk = vec![0u8; READ_CHUNK];
    while buf.len() < cap {
        let want = (cap - buf.len()).min(chunk.len());
        match reader.read(&mut chunk[..want]) {
            Ok(0) => return Ok((buf, false)),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    let mut probe = [0u8; 1];
    loop {
        match reader.read(&mut probe) {
            Ok(n) => return Ok((buf, n > 0)),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}

fn classify_transport(err: TransportError, host: &str, timeout: Duration) -> GatewayError {
    tracing::warn!(%host, error = %err, "outbound request failed");
    match err {
        TransportError::Timeout => GatewayError::TimedOut { after: timeout },
        TransportError::Tls(detail) => GatewayError::TlsFailed {
            host: host.to_string(),
            detail,
        },
        TransportError::Connect(detail) => GatewayError::ConnectionFailed {
            host: host.to_string(),
            detail,
        },
    }
}

fn classify_read(err: &io::Error, host: &str, timeout: Duration) -> GatewayError {
    tracing::warn!(%host, error = %err, "reading response body failed");
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => GatewayError::TimedOut { after: timeout },
        _ => GatewayError::ConnectionFailed {
            host: host.to_string(),
            detail: err.to_string(),
        },
    }
}

fn redacted_for_log(headers: &[(String, String)]) -> Vec<(&str, &str)> {
    headers
        .iter()
        .map(|(k, v)| {
            let sensitive = ["authorization", "cookie", "proxy-authorization"]
                .iter()
                .any(|s| k.eq_ignore_ascii_case(s));
            (k.as_str(), if sensitive { "[REDACTED]" } else { v.as_str() })
        })
        .collect()
}
