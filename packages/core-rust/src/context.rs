use rand::Rng;

/// Length of generated correlation identifiers.
pub const CORRELATION_ID_LEN: usize = 13;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Per-request context carrying the correlation identifier and the caller's
/// forwarded bearer credential.
///
/// Created once per inbound request and threaded by reference through every
/// remote call. Immutable after construction.
#[derive(Clone, PartialEq, Eq)]
pub struct CorrelationContext {
    id: String,
    bearer_token: Option<String>,
}

impl CorrelationContext {
    /// Creates a context with the given correlation id and no credential.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            bearer_token: None,
        }
    }

    /// Creates a context with a freshly generated correlation id.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(generate_correlation_id())
    }

    /// Uses the transport-supplied id when present and non-blank, otherwise
    /// generates one.
    #[must_use]
    pub fn from_transport(id: Option<&str>) -> Self {
        match id.map(str::trim) {
            Some(id) if !id.is_empty() => Self::new(id),
            _ => Self::generate(),
        }
    }

    /// Returns a copy of this context carrying the given bearer credential.
    ///
    /// A blank token is treated as absent.
    #[must_use]
    pub fn with_bearer(self, token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            id: self.id,
            bearer_token: (!token.trim().is_empty()).then_some(token),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }
}

impl std::fmt::Debug for CorrelationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationContext")
            .field("id", &self.id)
            .field(
                "bearer_token",
                &self.bearer_token.as_deref().map(crate::session::token_preview),
            )
            .finish()
    }
}

/// Generates a random 13-character lowercase base-36 correlation id.
#[must_use]
pub fn generate_correlation_id() -> String {
    let mut rng = rand::rng();
    (0..CORRELATION_ID_LEN)
        .map(|_| char::from(BASE36[rng.random_range(0..BASE36.len())]))
        .collect()
}
