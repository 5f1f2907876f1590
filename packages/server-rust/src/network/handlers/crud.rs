//! `POST /api/{resource}/{action}`: one catalogued CRUD operation per call.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use edgeway_core::{OrchestratorResult, RemoteError, Value};
use tracing::warn;

use super::{admit, bearer_token, correlation_context, AppState, ResultResponse};
use crate::orchestrator::lookup;
use crate::validation::variables_from;

const STATUS_NOT_FOUND: u16 = 404;

pub async fn crud_handler(
    State(state): State<AppState>,
    Path((resource, action)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let _guard = match admit(&state) {
        Ok(guard) => guard,
        Err(rejected) => return rejected,
    };
    let mut ctx = correlation_context(&headers);
    if let Some(token) = bearer_token(&headers, &state.session.cookie_name) {
        ctx = ctx.with_bearer(token);
    }

    let Some(op) = lookup(&resource, &action) else {
        warn!(correlation_id = ctx.id(), resource = %resource, action = %action, "unknown crud operation");
        let message = format!("unknown operation {resource}/{action}");
        let result: OrchestratorResult<Value> = OrchestratorResult::failure(
            STATUS_NOT_FOUND,
            vec![RemoteError::new(message.clone())],
            message,
        );
        return ResultResponse(result).into_response();
    };

    let variables = match variables_from(&body) {
        Ok(variables) => variables,
        Err(e) => return ResultResponse(e.into_result::<Value>()).into_response(),
    };

    ResultResponse(state.crud.execute(op, variables, &ctx).await).into_response()
}
