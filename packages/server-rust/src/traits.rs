use async_trait::async_trait;
use edgeway_core::{BusReply, RemoteRequestEnvelope};

use crate::bus::BusError;
use crate::orchestrator::notify::AuthOutcomeEvent;

/// Request/reply access to the shared message bus.
///
/// One `request` is one round-trip: exactly one reply or one failure. The
/// transport may queue or retry internally; callers enforce their own time
/// bound and never retry. Implementations must be reentrant, since a single
/// instance is shared read-only by every concurrent orchestration.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Send `envelope` on `subject` (the operation selector) and await the reply.
    async fn request(
        &self,
        subject: &str,
        envelope: RemoteRequestEnvelope,
    ) -> Result<BusReply, BusError>;

    /// Fire-and-forget event publication. No reply is awaited.
    async fn publish(&self, subject: &str, event: serde_json::Value) -> Result<(), BusError>;
}

/// Observability hook invoked once per terminal login/refresh outcome.
///
/// Implementations must not block: the orchestrator calls this inline on the
/// request path.
pub trait OutcomeNotifier: Send + Sync {
    fn notify(&self, event: AuthOutcomeEvent);
}
