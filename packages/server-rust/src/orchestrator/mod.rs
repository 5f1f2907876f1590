//! Orchestrations composed from forwarded remote calls.

pub mod crud;
pub mod login;
pub mod notify;

pub use crud::{lookup, CrudOperation, CrudOrchestrator};
pub use login::{AuthError, LoginOrchestrator, AUTH_FAILED_MESSAGE};
pub use notify::{AuthFlow, AuthOutcome, AuthOutcomeEvent, BusNotifier, NoopNotifier};
