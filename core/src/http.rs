//! HTTP data types shared by the validator, executor and formatter.
//!
//! # Design
//! These types describe requests and raw results as plain owned data. The
//! executor fills an `ExecutionResult`; the formatter consumes it. Neither
//! side needs to know which HTTP library performed the call.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

/// HTTP methods the gateway is willing to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// Methods whose request body is put on the wire.
    pub fn carries_payload(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl FromStr for HttpMethod {
    type Err = ();

    /// Case-insensitive parse of the seven supported methods.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            _ => Err(()),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw outcome of a completed outbound call.
///
/// `body` never holds more than the configured byte cap; `truncated` says
/// whether the server had more to send.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: u16,
    /// Response headers grouped by name as the HTTP library reports them.
    /// Duplicates are preserved and names are lowercase.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub final_url: Url,
    pub elapsed: Duration,
    pub truncated: bool,
}

impl ExecutionResult {
    /// First value of a header, by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
