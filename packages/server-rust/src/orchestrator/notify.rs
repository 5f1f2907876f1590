//! Login/refresh outcome notifications.
//!
//! Purely observational: a notifier can never change or delay the result a
//! caller receives.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::traits::{MessageBus, OutcomeNotifier};

/// Which authentication flow produced the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFlow {
    Login,
    Refresh,
}

/// Terminal state of one flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthOutcome {
    /// Tokens issued and menu loaded.
    Success,
    /// Tokens issued, menu unavailable.
    Degraded,
    /// No session issued.
    Failed,
}

/// One event per terminal login/refresh outcome. Never carries tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthOutcomeEvent {
    pub flow: AuthFlow,
    pub outcome: AuthOutcome,
    pub correlation_id: String,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub at: DateTime<Utc>,
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl OutcomeNotifier for NoopNotifier {
    fn notify(&self, _event: AuthOutcomeEvent) {}
}

/// Publishes events on the bus, fire-and-forget.
///
/// Publication runs on a spawned task; failures are logged and dropped.
/// Must be used from within a tokio runtime.
pub struct BusNotifier {
    bus: Arc<dyn MessageBus>,
    subject: String,
}

impl BusNotifier {
    #[must_use]
    pub fn new(bus: Arc<dyn MessageBus>, subject: impl Into<String>) -> Self {
        Self {
            bus,
            subject: subject.into(),
        }
    }
}

impl OutcomeNotifier for BusNotifier {
    fn notify(&self, event: AuthOutcomeEvent) {
        let payload = match serde_json::to_value(&event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode auth outcome event");
                return;
            }
        };
        let bus = Arc::clone(&self.bus);
        let subject = self.subject.clone();
        let correlation_id = event.correlation_id;
        tokio::spawn(async move {
            if let Err(e) = bus.publish(&subject, payload).await {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    subject = %subject,
                    error = %e,
                    "failed to publish auth outcome"
                );
            }
        });
    }
}
