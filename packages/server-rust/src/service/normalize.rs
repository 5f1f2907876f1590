//! Converts bus replies and pipeline failures into `OrchestratorResult`.

use edgeway_core::{coerce_dates, BusReply, OrchestratorResult, RemoteError, Value};

use super::operation::CallError;

/// Normalizes a reply that arrived over the bus.
///
/// A non-empty `errors` list wins over any `data`: the result carries the
/// errors verbatim, the reply's status (or `domain_error_status` when the
/// backend sent none) and the first error's message. Otherwise `data` is
/// deep-coerced into the body with status 200.
#[must_use]
pub fn normalize_reply(reply: BusReply, domain_error_status: u16) -> OrchestratorResult<Value> {
    if reply.domain_errors().is_some() {
        let status = reply.status_code.unwrap_or(domain_error_status);
        let errors = reply.errors.unwrap_or_default();
        let message = errors
            .first()
            .map(|e| e.message.clone())
            .or(reply.message)
            .unwrap_or_default();
        return OrchestratorResult::failure(status, errors, message);
    }

    let data = reply.data.map_or(Value::Null, Value::from);
    let mut result = OrchestratorResult::ok(coerce_dates(data));
    result.message = reply.message;
    result
}

/// Normalizes a failure that prevented any reply from arriving.
#[must_use]
pub fn normalize_error(error: &CallError) -> OrchestratorResult<Value> {
    let message = error.to_string();
    let mut detail = RemoteError::new(message.clone());
    detail
        .extra
        .insert("code".to_string(), serde_json::Value::from(error.code()));
    OrchestratorResult::failure(error.status_code(), vec![detail], message)
}
