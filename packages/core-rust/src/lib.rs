//! `Edgeway` core: correlation context, bus envelopes, orchestrator results and session models.

pub mod context;
pub mod dates;
pub mod envelope;
pub mod result;
pub mod session;
pub mod types;

pub use context::{generate_correlation_id, CorrelationContext};
pub use dates::coerce_dates;
pub use envelope::{BusReply, RemoteError, RemoteRequestEnvelope};
pub use result::OrchestratorResult;
pub use session::{token_preview, Credentials, Identifier, MenuItem, Permission, Role, Session, User};
pub use types::Value;
