//! Message-bus abstraction.
//!
//! This module contains:
//! - `BusError`: transport-level failures of a single round-trip
//! - `InMemoryBus`: in-process bus with scriptable subject handlers, used by
//!   tests and the development server
//!
//! The `MessageBus` trait itself lives in [`crate::traits`].

pub mod in_memory;

pub use in_memory::{InMemoryBus, RecordedRequest};

/// Errors a bus transport can report for one request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("no responders for subject '{subject}'")]
    NoResponders { subject: String },

    #[error("connection failed: {0}")]
    Connection(String),

    /// The remote side rejected the request outright (an RPC-level exception,
    /// as opposed to a reply carrying domain errors).
    #[error("{message}")]
    Rejected {
        status_code: Option<u16>,
        message: String,
    },

    #[error("malformed reply: {0}")]
    Codec(String),
}

impl BusError {
    /// Status code carried by the error, if the transport supplied one.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Rejected { status_code, .. } => *status_code,
            Self::NoResponders { .. } => Some(edgeway_core::result::STATUS_SERVICE_UNAVAILABLE),
            Self::Connection(_) | Self::Codec(_) => None,
        }
    }
}
