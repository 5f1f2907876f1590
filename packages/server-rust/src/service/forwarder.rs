//! Generic remote forwarder.
//!
//! Turns one local operation into one correlated, time-bounded bus request
//! and normalizes whatever comes back into an `OrchestratorResult`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use edgeway_core::result::{STATUS_BAD_REQUEST, STATUS_INTERNAL_ERROR};
use edgeway_core::{
    CorrelationContext, OrchestratorResult, RemoteError, RemoteRequestEnvelope, Value,
};
use tower::ServiceExt;
use tracing::{debug, error, info, warn};

use super::config::ForwarderConfig;
use super::dispatch::BusDispatcher;
use super::middleware::{build_call_pipeline, CallPipeline};
use super::normalize::{normalize_error, normalize_reply};
use super::operation::{CallContext, RemoteCall};
use crate::traits::MessageBus;

/// One operation to forward: subject, label, query text and variables.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    subject: String,
    operation: String,
    payload: String,
    variables: serde_json::Map<String, serde_json::Value>,
    domain_error_status: u16,
}

impl ForwardRequest {
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        operation: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            operation: operation.into(),
            payload: payload.into(),
            variables: serde_json::Map::new(),
            domain_error_status: STATUS_BAD_REQUEST,
        }
    }

    #[must_use]
    pub fn variables(mut self, variables: serde_json::Map<String, serde_json::Value>) -> Self {
        self.variables = variables;
        self
    }

    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Status used for domain errors when the backend supplies none (default 400).
    #[must_use]
    pub fn domain_error_status(mut self, status: u16) -> Self {
        self.domain_error_status = status;
        self
    }

    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

/// Sends operations over the bus through the call pipeline.
///
/// Shared by reference across all concurrent requests. Each `forward` is one
/// round-trip bounded by the configured call timeout; dropping the returned
/// future cancels the call.
pub struct RemoteForwarder {
    pipeline: CallPipeline,
    call_timeout_ms: u64,
    next_call_id: AtomicU64,
}

impl RemoteForwarder {
    #[must_use]
    pub fn new(bus: Arc<dyn MessageBus>, config: &ForwarderConfig) -> Self {
        Self {
            pipeline: build_call_pipeline(BusDispatcher::new(bus), config),
            call_timeout_ms: config.call_timeout_ms,
            next_call_id: AtomicU64::new(1),
        }
    }

    /// Forwards one operation and normalizes its outcome.
    ///
    /// Never fails: domain errors, transport errors and timeouts all come
    /// back as non-2xx results.
    pub async fn forward(
        &self,
        ctx: &CorrelationContext,
        request: ForwardRequest,
    ) -> OrchestratorResult<Value> {
        if request.operation.trim().is_empty() {
            error!(correlation_id = ctx.id(), "forward called without an operation name");
            return OrchestratorResult::failure(
                STATUS_INTERNAL_ERROR,
                vec![RemoteError::new("operation name must not be empty")],
                "operation name must not be empty",
            );
        }

        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        info!(
            correlation_id = ctx.id(),
            call_id,
            operation = %request.operation,
            subject = %request.subject,
            authorized = ctx.bearer_token().is_some(),
            "forwarding remote call"
        );
        if ctx.bearer_token().is_none() {
            debug!(
                correlation_id = ctx.id(),
                operation = %request.operation,
                "no bearer credential to forward"
            );
        }

        let envelope = RemoteRequestEnvelope::new(
            ctx,
            request.operation.clone(),
            request.payload,
            request.variables,
        );
        let call = RemoteCall::new(
            CallContext {
                call_id,
                correlation_id: ctx.id().to_string(),
                subject: request.subject,
                operation: request.operation.clone(),
                call_timeout_ms: self.call_timeout_ms,
            },
            envelope,
        );

        match self.pipeline.clone().oneshot(call).await {
            Ok(reply) => {
                let result = normalize_reply(reply, request.domain_error_status);
                if result.has_errors() {
                    warn!(
                        correlation_id = ctx.id(),
                        operation = %request.operation,
                        status_code = result.status_code,
                        error = result.first_error().unwrap_or_default(),
                        "remote call returned domain errors"
                    );
                }
                result
            }
            Err(e) => {
                let result = normalize_error(&e);
                error!(
                    correlation_id = ctx.id(),
                    operation = %request.operation,
                    status_code = result.status_code,
                    error = %e,
                    "remote call failed"
                );
                result
            }
        }
    }
}
