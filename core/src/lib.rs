//! Controlled egress gateway core.
//!
//! # Overview
//! Lets an untrusted caller make outbound HTTP requests only to hosts on a
//! configured allowlist, under hard limits on time, size and redirects.
//! Every call, successful or not, ends in a uniform JSON-serializable
//! `ResponseEnvelope`.
//!
//! # Design
//! - Data flows forward only: `request::validate` → `Allowlist::check` →
//!   `HttpExecutor::execute` → `format::format`, with `report::to_envelope`
//!   turning any `GatewayError` into a failure envelope. `Gateway` wires the
//!   stages together and is the only type a caller interface needs.
//! - The allowlist gate runs before any network activity and again on every
//!   redirect hop. Denial is the default.
//! - The network sits behind the `Transport` trait. `UreqTransport` is the
//!   production implementation; tests substitute stubs that record what
//!   would have been sent.
//! - `Settings` are built once from `GatewayConfig` and shared read-only.

pub mod allowlist;
pub mod config;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod format;
pub mod gateway;
pub mod http;
pub mod report;
pub mod request;
pub mod transport;

pub use allowlist::{is_allowed, Allowlist, AllowlistDecision, HostPattern};
pub use config::{GatewayConfig, OversizePolicy, Settings};
pub use envelope::{Body, ContentKind, ResponseEnvelope};
pub use error::{ConfigError, ErrorKind, GatewayError};
pub use executor::{HttpExecutor, Transport, TransportError};
pub use gateway::Gateway;
pub use http::{ExecutionResult, HttpMethod};
pub use request::{RawRequest, RequestDescription};
pub use transport::UreqTransport;
