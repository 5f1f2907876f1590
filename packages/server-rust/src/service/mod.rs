//! Remote-call forwarding framework.
//!
//! This module implements the service-oriented call pipeline:
//!
//! 1. **Call types** (`operation`): `RemoteCall`, `CallContext`, `CallError`
//! 2. **Middleware** (`middleware`): Tower layers (timeout, metrics, load-shedding)
//! 3. **Dispatch** (`dispatch`): one bus round-trip per call
//! 4. **Normalization** (`normalize`): replies and failures -> `OrchestratorResult`
//! 5. **Forwarder** (`forwarder`): the entry point used by every orchestrator

pub mod config;
pub mod dispatch;
pub mod forwarder;
pub mod middleware;
pub mod normalize;
pub mod operation;

// Re-export key types for convenient access.
pub use config::ForwarderConfig;
pub use dispatch::BusDispatcher;
pub use forwarder::{ForwardRequest, RemoteForwarder};
pub use normalize::{normalize_error, normalize_reply};
pub use operation::{CallContext, CallError, RemoteCall};
