//! Innermost pipeline service: sends a `RemoteCall` over the message bus.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use edgeway_core::BusReply;
use tower::Service;

use super::operation::{CallError, RemoteCall};
use crate::traits::MessageBus;

/// Dispatches each call as exactly one bus round-trip on its subject.
///
/// Never retries. Transport failures become `CallError::Transport`; replies
/// carrying domain errors pass through untouched.
#[derive(Clone)]
pub struct BusDispatcher {
    bus: Arc<dyn MessageBus>,
}

impl BusDispatcher {
    #[must_use]
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }
}

impl Service<RemoteCall> for BusDispatcher {
    type Response = BusReply;
    type Error = CallError;
    type Future = Pin<Box<dyn Future<Output = Result<BusReply, CallError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: RemoteCall) -> Self::Future {
        let bus = Arc::clone(&self.bus);
        let (ctx, envelope) = call.into_parts();
        Box::pin(async move {
            bus.request(&ctx.subject, envelope)
                .await
                .map_err(CallError::from)
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
