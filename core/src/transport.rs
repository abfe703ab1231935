//! `Transport` implementation on top of `ureq`.
//!
//! # Design
//! A fresh agent is built for every hop. The agent carries the hop's TLS
//! setting and remaining time budget, so an unverified call can never
//! share a connection pool with a verified one. Redirect following and
//! status-as-error are switched off: the executor sees every 3xx and every
//! 4xx/5xx as plain data.

use std::error::Error as StdError;
use std::io::{self, Read};

use ureq::tls::TlsConfig;
use ureq::Agent;

use crate::executor::{Hop, RawResponse, Transport, TransportError};

const USER_AGENT: &str = concat!("egress-gateway/", env!("CARGO_PKG_VERSION"));

/// Blocking HTTP/1.1 transport with rustls.
#[derive(Debug, Clone, Copy, Default)]
pub struct UreqTransport;

impl Transport for UreqTransport {
    fn send(&self, hop: &Hop<'_>) -> Result<RawResponse, TransportError> {
        let agent: Agent = Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(0)
            .max_redirects_will_error(false)
            .timeout_global(Some(hop.timeout))
            .tls_config(
                TlsConfig::builder()
                    .disable_verification(!hop.verify_ssl)
                    .build(),
            )
            .build()
            .new_agent();

        let mut builder = http::Request::builder()
            .method(hop.method.as_str())
            .uri(hop.url.as_str());
        for (name, value) in hop.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !hop.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("user-agent")) {
            builder = builder.header("user-agent", USER_AGENT);
        }

        let sent = match hop.body {
            Some(bytes) => builder.body(bytes).map(|req| agent.run(req)),
            None => builder.body(()).map(|req| agent.run(req)),
        };
        let response = sent
            .map_err(|err| TransportError::Connect(format!("could not build request: {err}")))?
            .map_err(classify)?;

        let status = response.status().as_u16();
        let headers = header_pairs(response.headers());
        let body = BodyStream(response.into_body().into_reader());

        Ok(RawResponse {
            status,
            headers,
            body: Box::new(body),
        })
    }
}

/// Flatten a header map. Values come out grouped by name, so interleaved
/// duplicates lose their relative wire order.
fn header_pairs(map: &http::HeaderMap) -> Vec<(String, String)> {
    map.iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// Body reader that reports ureq timeouts as `io::ErrorKind::TimedOut`.
struct BodyStream<R>(R);

impl<R: Read> Read for BodyStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf).map_err(|err| {
            let inner_timeout = err
                .get_ref()
                .and_then(|inner| inner.downcast_ref::<ureq::Error>())
                .is_some_and(|inner| matches!(inner, ureq::Error::Timeout(_)));
            if inner_timeout {
                io::Error::new(io::ErrorKind::TimedOut, err.to_string())
            } else {
                err
            }
        })
    }
}

fn classify(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Timeout(_) => TransportError::Timeout,
        ureq::Error::Io(ref io_err)
            if matches!(io_err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) =>
        {
            TransportError::Timeout
        }
        ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => {
            TransportError::Connect(err.to_string())
        }
        other if looks_like_tls(&other) => TransportError::Tls(describe(&other)),
        other => TransportError::Connect(describe(&other)),
    }
}

/// TLS failures arrive through several ureq variants; recognize them by the
/// error chain text.
fn looks_like_tls(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        let text = e.to_string().to_ascii_lowercase();
        if ["certificate", "tls", "handshake", "x509", "unknownissuer"]
            .iter()
            .any(|needle| text.contains(needle))
        {
            return true;
        }
        current = e.source();
    }
    false
}

fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
