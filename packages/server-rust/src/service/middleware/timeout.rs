//! Per-call reply bound.
//!
//! The bound comes from each call's `call_timeout_ms`, so login, menu and
//! CRUD calls can carry different limits through one pipeline. Expiry drops
//! the pending bus request and yields `CallError::Timeout` (504).

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use edgeway_core::BusReply;
use tower::{Layer, Service};

use crate::service::operation::{CallError, RemoteCall};

#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutLayer;

impl<S> Layer<S> for TimeoutLayer {
    type Service = CallTimeout<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CallTimeout { inner }
    }
}

#[derive(Debug, Clone)]
pub struct CallTimeout<S> {
    inner: S,
}

impl<S> Service<RemoteCall> for CallTimeout<S>
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
        let timeout_ms = call.ctx().call_timeout_ms;
        let pending = self.inner.call(call);
        Box::pin(async move {
            tokio::time::timeout(Duration::from_millis(timeout_ms), pending)
                .await
                .unwrap_or(Err(CallError::Timeout { timeout_ms }))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use edgeway_core::RemoteError;
    use serde_json::json;
    use tokio::time::Instant;
    use tower::ServiceExt;

    use super::*;
    use crate::bus::InMemoryBus;
    use crate::service::dispatch::BusDispatcher;

    fn bounded(bus: Arc<InMemoryBus>) -> CallTimeout<BusDispatcher> {
        TimeoutLayer.layer(BusDispatcher::new(bus))
    }

    #[tokio::test(start_paused = true)]
    async fn prompt_reply_is_returned_unchanged() {
        let bus = Arc::new(InMemoryBus::recording());
        bus.reply_with(
            "menu_request",
            BusReply::data(json!({ "getSidebarMenu": [] })),
        );

        let reply = bounded(bus)
            .oneshot(RemoteCall::sample("menu_request", "getSidebarMenu", 10_000))
            .await
            .unwrap();
        assert_eq!(reply.data, Some(json!({ "getSidebarMenu": [] })));
    }

    #[tokio::test(start_paused = true)]
    async fn domain_errors_are_not_timeouts() {
        let bus = Arc::new(InMemoryBus::recording());
        bus.reply_with(
            "graphql_request",
            BusReply::errors(vec![RemoteError::new("Role not found")], Some(404)),
        );

        let reply = bounded(bus)
            .oneshot(RemoteCall::sample("graphql_request", "findRoleById", 10_000))
            .await
            .unwrap();
        assert!(reply.domain_errors().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_backend_fails_at_the_call_bound() {
        let bus = Arc::new(InMemoryBus::recording());
        bus.silence("login_request");
        let started = Instant::now();

        let err = bounded(bus)
            .oneshot(RemoteCall::sample("login_request", "loginUser", 10_000))
            .await
            .unwrap_err();

        assert!(matches!(err, CallError::Timeout { timeout_ms: 10_000 }));
        assert_eq!(err.status_code(), 504);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(10));
        assert!(waited < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn each_call_carries_its_own_bound() {
        let bus = Arc::new(InMemoryBus::recording());
        bus.on("menu_request", |_| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Ok(BusReply::data(json!({ "getSidebarMenu": [] })))
        });
        let svc = bounded(bus);

        let short = svc
            .clone()
            .oneshot(RemoteCall::sample("menu_request", "getSidebarMenu", 1_000))
            .await;
        assert!(matches!(short, Err(CallError::Timeout { timeout_ms: 1_000 })));

        let long = svc
            .oneshot(RemoteCall::sample("menu_request", "getSidebarMenu", 5_000))
            .await;
        assert!(long.is_ok());
    }
}
