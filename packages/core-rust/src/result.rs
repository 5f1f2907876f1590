use serde::{Deserialize, Serialize};

use crate::envelope::RemoteError;

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_UNAUTHORIZED: u16 = 401;
pub const STATUS_INTERNAL_ERROR: u16 = 500;
pub const STATUS_SERVICE_UNAVAILABLE: u16 = 503;
pub const STATUS_GATEWAY_TIMEOUT: u16 = 504;

/// The single result contract returned by every orchestration operation.
///
/// Expected failures (validation, upstream errors, timeouts) are values of
/// this type, never panics. Every terminal path sets at least one of `body`
/// and `errors`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorResult<T> {
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub body: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub errors: Option<Vec<RemoteError>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub success: Option<bool>,
}

impl<T> OrchestratorResult<T> {
    /// A 200 result carrying `body`.
    #[must_use]
    pub fn ok(body: T) -> Self {
        Self {
            status_code: STATUS_OK,
            body: Some(body),
            errors: None,
            message: None,
            success: None,
        }
    }

    /// A failed result with no body.
    #[must_use]
    pub fn failure(status_code: u16, errors: Vec<RemoteError>, message: impl Into<String>) -> Self {
        Self {
            status_code,
            body: None,
            errors: Some(errors),
            message: Some(message.into()),
            success: Some(false),
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    /// True when the result carries a non-empty error list.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// True for a 2xx status with no errors.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code) && !self.has_errors()
    }

    /// First error message, if any.
    #[must_use]
    pub fn first_error(&self) -> Option<&str> {
        self.errors
            .as_ref()
            .and_then(|e| e.first())
            .map(|e| e.message.as_str())
    }

    /// Transforms the body, keeping status, errors, message and success.
    pub fn map_body<U>(self, f: impl FnOnce(T) -> U) -> OrchestratorResult<U> {
        OrchestratorResult {
            status_code: self.status_code,
            body: self.body.map(f),
            errors: self.errors,
            message: self.message,
            success: self.success,
        }
    }

    /// Re-types a result that carries no body (an error result).
    #[must_use]
    pub fn without_body<U>(self) -> OrchestratorResult<U> {
        OrchestratorResult {
            status_code: self.status_code,
            body: None,
            errors: self.errors,
            message: self.message,
            success: self.success,
        }
    }
}
