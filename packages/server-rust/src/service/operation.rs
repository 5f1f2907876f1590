//! Remote call types flowing through the forwarder pipeline.

use edgeway_core::result::{
    STATUS_GATEWAY_TIMEOUT, STATUS_INTERNAL_ERROR, STATUS_SERVICE_UNAVAILABLE,
};
use edgeway_core::RemoteRequestEnvelope;

use crate::bus::BusError;

/// Context carried with every remote call through the pipeline.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Process-local sequence number, for log correlation between layers.
    pub call_id: u64,
    pub correlation_id: String,
    /// Bus subject the call is sent on.
    pub subject: String,
    /// Operation label used in logs.
    pub operation: String,
    pub call_timeout_ms: u64,
}

/// One remote call: its pipeline context plus the envelope sent on the bus.
#[derive(Debug, Clone)]
pub struct RemoteCall {
    ctx: CallContext,
    envelope: RemoteRequestEnvelope,
}

impl RemoteCall {
    #[must_use]
    pub fn new(ctx: CallContext, envelope: RemoteRequestEnvelope) -> Self {
        Self { ctx, envelope }
    }

    #[must_use]
    pub fn ctx(&self) -> &CallContext {
        &self.ctx
    }

    #[must_use]
    pub fn envelope(&self) -> &RemoteRequestEnvelope {
        &self.envelope
    }

    #[must_use]
    pub fn into_parts(self) -> (CallContext, RemoteRequestEnvelope) {
        (self.ctx, self.envelope)
    }
}

/// Errors produced by the pipeline instead of a bus reply.
///
/// Domain errors are not represented here: they arrive inside a successful
/// `BusReply` and are handled by the normalizer.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("Timeout: no reply within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error(transparent)]
    Transport(#[from] BusError),
    #[error("gateway overloaded, try again later")]
    Overloaded,
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CallError {
    /// HTTP-style status this failure surfaces as.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Timeout { .. } => STATUS_GATEWAY_TIMEOUT,
            Self::Transport(e) => e.status_code().unwrap_or(STATUS_INTERNAL_ERROR),
            Self::Overloaded => STATUS_SERVICE_UNAVAILABLE,
            Self::Internal(_) => STATUS_INTERNAL_ERROR,
        }
    }

    /// Stable machine-readable code attached to the normalized error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "UPSTREAM_TIMEOUT",
            Self::Transport(_) => "UPSTREAM_TRANSPORT_ERROR",
            Self::Overloaded => "OVERLOADED",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

#[cfg(test)]
impl RemoteCall {
    /// Call on `subject` with no variables, for exercising pipeline layers.
    pub(crate) fn sample(subject: &str, operation: &str, call_timeout_ms: u64) -> Self {
        let correlation = edgeway_core::CorrelationContext::new("corr-sample");
        let envelope = RemoteRequestEnvelope::new(
            &correlation,
            operation,
            "query Sample { sample }",
            serde_json::Map::new(),
        );
        let ctx = CallContext {
            call_id: 1,
            correlation_id: correlation.id().to_string(),
            subject: subject.to_string(),
            operation: operation.to_string(),
            call_timeout_ms,
        };
        Self::new(ctx, envelope)
    }
}
