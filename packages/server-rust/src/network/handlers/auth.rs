//! Login and refresh endpoints.
//!
//! Both accept a plain JSON body or the GraphQL-shaped `{variables: {...}}`
//! form, and deliver an issued session as an HTTP-only access cookie plus a
//! redacted body.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use edgeway_core::result::STATUS_INTERNAL_ERROR;
use edgeway_core::{CorrelationContext, OrchestratorResult, RemoteError, Session};
use tracing::{error, info};

use super::{admit, correlation_context, AppState, ResultResponse};
use crate::orchestrator::{AuthFlow, AUTH_FAILED_MESSAGE};
use crate::session::{deliver, SessionBody, SessionConfig};
use crate::validation::{credentials_from, refresh_token_from};

/// `POST /auth/login`
pub async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let _guard = match admit(&state) {
        Ok(guard) => guard,
        Err(rejected) => return rejected,
    };
    let ctx = correlation_context(&headers);

    let credentials = match credentials_from(&body) {
        Ok(credentials) => credentials,
        Err(e) => {
            let result = state.login.reject(AuthFlow::Login, e, &ctx);
            return session_response(result, &state.session, &ctx);
        }
    };

    let result = state.login.login(&credentials, &ctx).await;
    info!(correlation_id = ctx.id(), status_code = result.status_code, "login handled");
    session_response(result, &state.session, &ctx)
}

/// `POST /auth/refresh`
pub async fn refresh_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let _guard = match admit(&state) {
        Ok(guard) => guard,
        Err(rejected) => return rejected,
    };
    let ctx = correlation_context(&headers);

    let refresh_token = match refresh_token_from(&body) {
        Ok(token) => token,
        Err(e) => {
            let result = state.login.reject(AuthFlow::Refresh, e, &ctx);
            return session_response(result, &state.session, &ctx);
        }
    };

    let result = state.login.refresh(&refresh_token, &ctx).await;
    info!(correlation_id = ctx.id(), status_code = result.status_code, "refresh handled");
    session_response(result, &state.session, &ctx)
}

/// Sets the access cookie and swaps the session for its redacted body.
///
/// A session that cannot be written as a cookie becomes a 500, never a body
/// whose placeholder points at a cookie that was not set.
fn session_response(
    mut result: OrchestratorResult<Session>,
    config: &SessionConfig,
    ctx: &CorrelationContext,
) -> Response {
    let Some(session) = result.body.take() else {
        return ResultResponse(result.without_body::<SessionBody>()).into_response();
    };

    let delivered = deliver(session, config, Utc::now())
        .map_err(|e| e.to_string())
        .and_then(|delivery| {
            HeaderValue::from_str(&delivery.set_cookie)
                .map(|cookie| (cookie, delivery.body))
                .map_err(|_| "session cookie is not a valid header value".to_string())
        });

    match delivered {
        Ok((cookie, body)) => {
            let mut result = result.without_body::<SessionBody>();
            result.body = Some(body);
            let mut response = ResultResponse(result).into_response();
            response.headers_mut().append(SET_COOKIE, cookie);
            response
        }
        Err(reason) => {
            error!(correlation_id = ctx.id(), %reason, "issued session could not be delivered");
            let failure = OrchestratorResult::<SessionBody>::failure(
                STATUS_INTERNAL_ERROR,
                vec![RemoteError::new(reason)],
                AUTH_FAILED_MESSAGE,
            );
            ResultResponse(failure).into_response()
        }
    }
}
