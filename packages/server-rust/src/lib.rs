//! `Edgeway` server: message-bus forwarder, login/refresh orchestration and the HTTP edge.

pub mod bus;
pub mod config;
pub mod network;
pub mod orchestrator;
pub mod service;
pub mod session;
pub mod telemetry;
pub mod traits;
pub mod validation;

pub use config::{Cli, GatewayConfig, SubjectConfig};
pub use network::NetworkModule;
pub use traits::{MessageBus, OutcomeNotifier};
