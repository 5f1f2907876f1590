//! In-process message bus.
//!
//! Each subject is served by one handler closure. Requests on subjects without
//! a handler fail with `BusError::NoResponders`. A bus built with
//! [`InMemoryBus::recording`] keeps every request and published event so tests
//! can assert on what was sent. Envelopes carry credentials, so a plain
//! [`InMemoryBus::new`] keeps nothing.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use edgeway_core::{BusReply, RemoteRequestEnvelope};
use parking_lot::Mutex;

use super::BusError;
use crate::traits::MessageBus;

type HandlerFuture = Pin<Box<dyn Future<Output = Result<BusReply, BusError>> + Send>>;

type Handler = Arc<dyn Fn(RemoteRequestEnvelope) -> HandlerFuture + Send + Sync>;

/// A request observed by the bus, in arrival order.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub subject: String,
    pub envelope: RemoteRequestEnvelope,
}

/// In-memory `MessageBus` with scriptable per-subject handlers.
#[derive(Default)]
pub struct InMemoryBus {
    handlers: DashMap<String, Handler>,
    requests: Mutex<Vec<RecordedRequest>>,
    published: Mutex<Vec<(String, serde_json::Value)>>,
    record: bool,
}

impl InMemoryBus {
    /// Bus that retains nothing it carries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus that keeps every request and published event for inspection.
    #[must_use]
    pub fn recording() -> Self {
        Self {
            record: true,
            ..Self::default()
        }
    }

    /// Serve `subject` with an async handler. Replaces any previous handler.
    pub fn on<F, Fut>(&self, subject: &str, handler: F)
    where
        F: Fn(RemoteRequestEnvelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<BusReply, BusError>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |envelope| Box::pin(handler(envelope)));
        self.handlers.insert(subject.to_string(), handler);
    }

    /// Answer every request on `subject` with the same reply.
    pub fn reply_with(&self, subject: &str, reply: BusReply) {
        self.on(subject, move |_| {
            let reply = reply.clone();
            async move { Ok(reply) }
        });
    }

    /// Fail every request on `subject` with the same transport error.
    pub fn fail_with(&self, subject: &str, error: BusError) {
        self.on(subject, move |_| {
            let error = error.clone();
            async move { Err(error) }
        });
    }

    /// Accept requests on `subject` but never answer them.
    pub fn silence(&self, subject: &str) {
        self.on(subject, |_| std::future::pending());
    }

    /// Stop serving `subject`.
    pub fn remove(&self, subject: &str) {
        self.handlers.remove(subject);
    }

    /// All requests received so far, in arrival order. Empty unless recording.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Requests received on one subject.
    #[must_use]
    pub fn requests_for(&self, subject: &str) -> Vec<RemoteRequestEnvelope> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.subject == subject)
            .map(|r| r.envelope.clone())
            .collect()
    }

    /// Events published so far as `(subject, event)` pairs.
    #[must_use]
    pub fn published(&self) -> Vec<(String, serde_json::Value)> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn request(
        &self,
        subject: &str,
        envelope: RemoteRequestEnvelope,
    ) -> Result<BusReply, BusError> {
        if self.record {
            self.requests.lock().push(RecordedRequest {
                subject: subject.to_string(),
                envelope: envelope.clone(),
            });
        }

        // Clone the handler out so the map shard lock is not held across the await.
        let handler = self
            .handlers
            .get(subject)
            .map(|entry| Arc::clone(entry.value()));

        match handler {
            Some(handler) => handler(envelope).await,
            None => Err(BusError::NoResponders {
                subject: subject.to_string(),
            }),
        }
    }

    async fn publish(&self, subject: &str, event: serde_json::Value) -> Result<(), BusError> {
        if self.record {
            self.published.lock().push((subject.to_string(), event));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use edgeway_core::CorrelationContext;
    use serde_json::json;

    use super::*;

    fn envelope() -> RemoteRequestEnvelope {
        RemoteRequestEnvelope::new(
            &CorrelationContext::new("c-1"),
            "op",
            "query Q",
            serde_json::Map::new(),
        )
    }

    #[tokio::test]
    async fn unregistered_subject_has_no_responders() {
        let bus = InMemoryBus::recording();
        let err = bus.request("nowhere", envelope()).await.unwrap_err();
        assert!(matches!(err, BusError::NoResponders { subject } if subject == "nowhere"));
    }

    #[tokio::test]
    async fn reply_with_answers_and_records() {
        let bus = InMemoryBus::recording();
        bus.reply_with("graphql_request", BusReply::data(json!({"ok": true})));

        let reply = bus.request("graphql_request", envelope()).await.unwrap();
        assert_eq!(reply.data, Some(json!({"ok": true})));

        let recorded = bus.requests_for("graphql_request");
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].correlation_id(), Some("c-1"));
    }

    #[tokio::test]
    async fn plain_bus_retains_nothing() {
        let bus = InMemoryBus::new();
        bus.reply_with("login_request", BusReply::data(json!({"ok": true})));

        for _ in 0..100 {
            bus.request("login_request", envelope()).await.unwrap();
        }
        bus.publish("auth.login.outcome", json!({"outcome": "success"}))
            .await
            .unwrap();

        assert!(bus.requests().is_empty());
        assert!(bus.requests_for("login_request").is_empty());
        assert!(bus.published().is_empty());
        assert_eq!(bus.requests.lock().capacity(), 0);
    }

    #[tokio::test]
    async fn handler_sees_envelope() {
        let bus = InMemoryBus::new();
        bus.on("echo", |env| async move {
            Ok(BusReply::data(json!({ "query": env.payload })))
        });
        let reply = bus.request("echo", envelope()).await.unwrap();
        assert_eq!(reply.data, Some(json!({"query": "query Q"})));
    }

    #[tokio::test]
    async fn fail_with_returns_transport_error() {
        let bus = InMemoryBus::recording();
        bus.fail_with("auth", BusError::Connection("reset".into()));
        let err = bus.request("auth", envelope()).await.unwrap_err();
        assert_eq!(err, BusError::Connection("reset".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn silenced_subject_never_answers() {
        let bus = InMemoryBus::recording();
        bus.silence("slow");
        let outcome = tokio::time::timeout(Duration::from_secs(60), bus.request("slow", envelope())).await;
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn publish_is_recorded() {
        let bus = InMemoryBus::recording();
        bus.publish("auth.login.outcome", json!({"outcome": "success"}))
            .await
            .unwrap();
        assert_eq!(bus.published().len(), 1);
    }
}
