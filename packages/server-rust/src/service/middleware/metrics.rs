//! Call timing and outcome.
//!
//! Each call runs inside a `remote_call` tracing span and feeds two
//! `metrics` series labelled by subject and outcome:
//! `edgeway_remote_calls_total` and `edgeway_remote_call_duration_seconds`.
//! Without an installed recorder the macros are no-ops.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use edgeway_core::BusReply;
use metrics::{counter, histogram};
use tower::{Layer, Service};
use tracing::{field, info_span, Instrument, Span};

use crate::service::operation::{CallError, RemoteCall};

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = CallMetrics<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CallMetrics { inner }
    }
}

#[derive(Debug, Clone)]
pub struct CallMetrics<S> {
    inner: S,
}

/// Label for how a call ended. A reply with domain errors still completed its
/// round-trip, so it gets its own label rather than `error`.
fn outcome_of(result: &Result<BusReply, CallError>) -> &'static str {
    match result {
        Ok(reply) if reply.domain_errors().is_some() => "domain_error",
        Ok(_) => "ok",
        Err(CallError::Timeout { .. }) => "timeout",
        Err(CallError::Overloaded) => "shed",
        Err(CallError::Transport(_) | CallError::Internal(_)) => "error",
    }
}

impl<S> Service<RemoteCall> for CallMetrics<S>
where
    S: Service<RemoteCall, Response = BusReply, Error = CallError> + Send,
    S::Future: Send + 'static,
{
    type Response = BusReply;
    type Error = CallError;
    type Future = Pin<Box<dyn Future<Output = Result<BusReply, CallError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, call: RemoteCall) -> Self::Future {
        let subject = call.ctx().subject.clone();
        let span = {
            let ctx = call.ctx();
            info_span!(
                "remote_call",
                call_id = ctx.call_id,
                correlation_id = %ctx.correlation_id,
                subject = %ctx.subject,
                operation = %ctx.operation,
                duration_ms = field::Empty,
                outcome = field::Empty,
            )
        };
        let pending = self.inner.call(call);

        Box::pin(
            async move {
                let started = Instant::now();
                let result = pending.await;
                let elapsed = started.elapsed();
                let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
                let outcome = outcome_of(&result);

                histogram!(
                    "edgeway_remote_call_duration_seconds",
                    "subject" => subject.clone(),
                    "outcome" => outcome
                )
                .record(elapsed.as_secs_f64());
                counter!(
                    "edgeway_remote_calls_total",
                    "subject" => subject,
                    "outcome" => outcome
                )
                .increment(1);

                let span = Span::current();
                span.record("duration_ms", duration_ms);
                span.record("outcome", outcome);
                tracing::debug!(duration_ms, outcome, "remote call settled");

                result
            }
            .instrument(span),
        )
    }
}
