//! HTTP handlers and the state they share.

pub mod auth;
pub mod crud;
pub mod health;

pub use auth::{login_handler, refresh_handler};
pub use crud::crud_handler;
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use edgeway_core::envelope::CORRELATION_HEADER;
use edgeway_core::result::STATUS_SERVICE_UNAVAILABLE;
use edgeway_core::{CorrelationContext, OrchestratorResult, RemoteError};
use serde::Serialize;

use super::middleware::REQUEST_ID_HEADER;
use super::{InFlightGuard, ShutdownController};
use crate::orchestrator::{CrudOrchestrator, LoginOrchestrator};
use crate::session::{cookie_value, SessionConfig};

/// Shared state handed to every handler. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub login: Arc<LoginOrchestrator>,
    pub crud: Arc<CrudOrchestrator>,
    pub session: Arc<SessionConfig>,
    pub shutdown: Arc<ShutdownController>,
    /// Process start, for uptime.
    pub start_time: Instant,
}

/// Writes an [`OrchestratorResult`] as JSON with its status code.
#[derive(Debug)]
pub struct ResultResponse<T>(pub OrchestratorResult<T>);

impl<T: Serialize> IntoResponse for ResultResponse<T> {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0)).into_response()
    }
}

/// Takes an in-flight guard, or rejects with 503 while not ready.
fn admit(state: &AppState) -> Result<InFlightGuard, Response> {
    if state.shutdown.is_accepting() {
        return Ok(state.shutdown.in_flight_guard());
    }
    let result: OrchestratorResult<()> = OrchestratorResult::failure(
        STATUS_SERVICE_UNAVAILABLE,
        vec![RemoteError::new("gateway is not accepting requests")],
        "gateway is not accepting requests",
    );
    Err(ResultResponse(result).into_response())
}

/// Correlation context for an inbound request.
///
/// An explicit `X-Correlation-ID` wins over `x-request-id`, which the request
/// id layer always fills.
fn correlation_context(headers: &HeaderMap) -> CorrelationContext {
    let id = header_str(headers, CORRELATION_HEADER)
        .filter(|v| !v.trim().is_empty())
        .or_else(|| header_str(headers, REQUEST_ID_HEADER));
    CorrelationContext::from_transport(id)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Caller's bearer credential: `Authorization: Bearer` first, then the
/// session cookie.
fn bearer_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let from_header = header_str(headers, AUTHORIZATION.as_str())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = from_header {
        return Some(token.to_string());
    }
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|cookies| cookie_value(cookies, cookie_name))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn correlation_prefers_explicit_header() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("req-1"));
        assert_eq!(correlation_context(&headers).id(), "req-1");

        headers.insert("x-correlation-id", HeaderValue::from_static("corr-1"));
        assert_eq!(correlation_context(&headers).id(), "corr-1");
    }

    #[test]
    fn correlation_generated_when_absent() {
        let ctx = correlation_context(&HeaderMap::new());
        assert_eq!(ctx.id().len(), 13);
    }

    #[test]
    fn bearer_from_header_then_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; access_token=C1"));
        assert_eq!(bearer_token(&headers, "access_token").as_deref(), Some("C1"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer H1"));
        assert_eq!(bearer_token(&headers, "access_token").as_deref(), Some("H1"));

        assert_eq!(bearer_token(&HeaderMap::new(), "access_token"), None);
    }

    #[test]
    fn result_response_uses_status_code() {
        let result: OrchestratorResult<()> =
            OrchestratorResult::failure(504, vec![RemoteError::new("Timeout")], "Timeout");
        let response = ResultResponse(result).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
