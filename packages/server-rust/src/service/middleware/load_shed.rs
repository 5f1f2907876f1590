//! Concurrency cap for outbound remote calls.
//!
//! Each call holds one semaphore permit until its bus round-trip settles.
//! A call arriving with no permit free fails at once with
//! `CallError::Overloaded` (503) instead of queueing behind slow backends.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use edgeway_core::BusReply;
use tokio::sync::Semaphore;
use tower::{Layer, Service};

use crate::service::operation::{CallError, RemoteCall};

#[derive(Debug, Clone)]
pub struct LoadShedLayer {
    permits: Arc<Semaphore>,
}

impl LoadShedLayer {
    /// Shares `max_concurrent` permits among every service this layer wraps.
    #[must_use]
    pub fn new(max_concurrent: u32) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent as usize)),
        }
    }
}

impl<S> Layer<S> for LoadShedLayer {
    type Service = LoadShed<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoadShed {
            inner,
            permits: Arc::clone(&self.permits),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadShed<S> {
    inner: S,
    permits: Arc<Semaphore>,
}

impl<S> Service<RemoteCall> for LoadShed<S>
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
        match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => {
                let pending = self.inner.call(call);
                Box::pin(async move {
                    let reply = pending.await;
                    drop(permit);
                    reply
                })
            }
            Err(_) => {
                let ctx = call.ctx();
                tracing::warn!(
                    correlation_id = %ctx.correlation_id,
                    subject = %ctx.subject,
                    operation = %ctx.operation,
                    "remote call shed, concurrency cap reached"
                );
                Box::pin(std::future::ready(Err(CallError::Overloaded)))
            }
        }
    }
}
