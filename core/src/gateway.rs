//! End-to-end pipeline: validate, match, execute, format.
//!
//! # Design
//! `Gateway` is the only type a caller interface talks to. Every outcome,
//! including a panic inside the blocking worker, comes back as a
//! `ResponseEnvelope`; nothing is thrown past this boundary.
//!
//! `Settings` sit behind an `Arc` and are never mutated after construction,
//! so concurrent calls share them without locking.

use std::sync::Arc;

use crate::config::Settings;
use crate::envelope::ResponseEnvelope;
use crate::error::GatewayError;
use crate::executor::{HttpExecutor, Transport};
use crate::format;
use crate::report;
use crate::request::{self, RawRequest};
use crate::transport::UreqTransport;

/// The outbound gateway.
#[derive(Debug)]
pub struct Gateway<T = UreqTransport> {
    settings: Arc<Settings>,
    executor: HttpExecutor<T>,
}

impl Gateway<UreqTransport> {
    pub fn new(settings: impl Into<Arc<Settings>>) -> Self {
        Self::with_transport(settings, UreqTransport)
    }
}

impl<T: Transport> Gateway<T> {
    pub fn with_transport(settings: impl Into<Arc<Settings>>, transport: T) -> Self {
        Self {
            settings: settings.into(),
            executor: HttpExecutor::new(transport),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn transport(&self) -> &T {
        self.executor.transport()
    }

    /// Run one call to completion.
    pub fn handle(&self, raw: RawRequest) -> ResponseEnvelope {
        let span = tracing::info_span!(
            "egress.fetch",
            request_id = %uuid::Uuid::new_v4(),
            method = tracing::field::Empty,
            host = tracing::field::Empty,
        );
        let _entered = span.enter();

        match self.run(raw, &span) {
            Ok(envelope) => envelope,
            Err(err) => report::to_envelope(&err),
        }
    }

    /// Parse a JSON request document and run it.
    ///
    /// Input that is not a JSON object with a string `url` yields an
    /// `InvalidRequest` envelope.
    pub fn handle_json(&self, payload: &str) -> ResponseEnvelope {
        match serde_json::from_str::<RawRequest>(payload) {
            Ok(raw) => self.handle(raw),
            Err(err) => report::to_envelope(&GatewayError::InvalidRequest {
                reason: "request must be a JSON object with a string 'url'",
                detail: Some(err.to_string()),
            }),
        }
    }

    fn run(&self, raw: RawRequest, span: &tracing::Span) -> Result<ResponseEnvelope, GatewayError> {
        let request = request::validate(raw, &self.settings)?;
        span.record("method", request.method.as_str());
        span.record("host", request.host.as_str());

        let decision = self.settings.allowlist.check(&request.host);
        let result = self.executor.execute(&request, &decision, &self.settings)?;
        Ok(format::format(result, &self.settings.redaction))
    }
}

impl<T: Transport + 'static> Gateway<T> {
    /// Run one call on tokio's blocking pool.
    pub async fn handle_async(self: &Arc<Self>, raw: RawRequest) -> ResponseEnvelope {
        let gateway = Arc::clone(self);
        match tokio::task::spawn_blocking(move || gateway.handle(raw)).await {
            Ok(envelope) => envelope,
            Err(err) => report::to_envelope(&GatewayError::Internal {
                detail: format!("gateway worker failed: {err}"),
            }),
        }
    }
}
