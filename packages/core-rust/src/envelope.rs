//! Message-bus request and reply shapes.
//!
//! A remote call is one `RemoteRequestEnvelope` sent on a subject (the
//! operation selector) and answered by exactly one `BusReply`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::context::CorrelationContext;

/// Header carrying the correlation id on every outbound call.
pub const CORRELATION_HEADER: &str = "X-Correlation-ID";
/// Header carrying the forwarded bearer credential, when one exists.
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// One outbound remote call: a declarative query/command plus its variables
/// and transport headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRequestEnvelope {
    /// Operation label, used for logging. Not sent to the backend.
    #[serde(skip)]
    pub operation: String,
    /// Query or command text.
    #[serde(rename = "query")]
    pub payload: String,
    pub variables: serde_json::Map<String, serde_json::Value>,
    pub headers: BTreeMap<String, String>,
}

impl RemoteRequestEnvelope {
    /// Builds a fresh envelope for one call.
    ///
    /// Always sets `X-Correlation-ID`; sets `Authorization: Bearer <token>` iff
    /// the context carries a credential.
    #[must_use]
    pub fn new(
        ctx: &CorrelationContext,
        operation: impl Into<String>,
        payload: impl Into<String>,
        variables: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(CORRELATION_HEADER.to_string(), ctx.id().to_string());
        if let Some(token) = ctx.bearer_token() {
            headers.insert(AUTHORIZATION_HEADER.to_string(), format!("Bearer {token}"));
        }
        Self {
            operation: operation.into(),
            payload: payload.into(),
            variables,
            headers,
        }
    }

    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.headers.get(CORRELATION_HEADER).map(String::as_str)
    }

    #[must_use]
    pub fn authorization(&self) -> Option<&str> {
        self.headers.get(AUTHORIZATION_HEADER).map(String::as_str)
    }
}

/// A domain-level error reported by a backend.
///
/// Only `message` is required; any other fields (`path`, `extensions`, ...)
/// are preserved verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    pub message: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RemoteError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            extra: serde_json::Map::new(),
        }
    }
}

/// The single reply to a remote call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusReply {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub errors: Option<Vec<RemoteError>>,
    /// Status hint from the backend; only meaningful alongside `errors`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}

impl BusReply {
    /// A successful reply carrying `data`.
    #[must_use]
    pub fn data(data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    /// An error reply carrying domain errors and an optional status hint.
    #[must_use]
    pub fn errors(errors: Vec<RemoteError>, status_code: Option<u16>) -> Self {
        Self {
            errors: Some(errors),
            status_code,
            ..Self::default()
        }
    }

    /// Returns the domain errors if the list is present and non-empty.
    #[must_use]
    pub fn domain_errors(&self) -> Option<&[RemoteError]> {
        self.errors.as_deref().filter(|e| !e.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn envelope_always_carries_correlation_header() {
        let ctx = CorrelationContext::new("corr-1");
        let env = RemoteRequestEnvelope::new(&ctx, "findAllRoles", "query {}", serde_json::Map::new());
        assert_eq!(env.correlation_id(), Some("corr-1"));
        assert!(env.authorization().is_none());
        assert_eq!(env.headers.len(), 1);
    }

    #[test]
    fn envelope_sets_authorization_iff_bearer_present() {
        let ctx = CorrelationContext::new("corr-1").with_bearer("tok");
        let env = RemoteRequestEnvelope::new(&ctx, "op", "q", serde_json::Map::new());
        assert_eq!(env.authorization(), Some("Bearer tok"));
    }

    #[test]
    fn envelope_wire_shape() {
        let ctx = CorrelationContext::new("c");
        let mut vars = serde_json::Map::new();
        vars.insert("id".into(), json!(3));
        let env = RemoteRequestEnvelope::new(&ctx, "op", "query Q", vars);
        let wire = serde_json::to_value(&env).unwrap();
        assert_eq!(
            wire,
            json!({
                "query": "query Q",
                "variables": { "id": 3 },
                "headers": { "X-Correlation-ID": "c" }
            })
        );
    }

    #[test]
    fn reply_parses_errors_with_extra_fields() {
        let reply: BusReply = serde_json::from_value(json!({
            "errors": [{ "message": "Invalid credentials", "path": ["loginUser"] }],
            "statusCode": 401
        }))
        .unwrap();
        let errors = reply.domain_errors().unwrap();
        assert_eq!(errors[0].message, "Invalid credentials");
        assert_eq!(errors[0].extra["path"], json!(["loginUser"]));
        assert_eq!(reply.status_code, Some(401));
    }

    #[test]
    fn empty_error_list_is_not_a_domain_error() {
        let reply = BusReply::errors(vec![], None);
        assert!(reply.domain_errors().is_none());
    }
}
