//! Inbound payload validation. Runs before any remote call is made.

use edgeway_core::result::STATUS_BAD_REQUEST;
use edgeway_core::{Credentials, OrchestratorResult, RemoteError};
use serde_json::{Map, Value as Json};

/// Rejected inbound input. Always surfaces as a 400 result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("request body is not valid JSON: {0}")]
    MalformedBody(String),
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("{0} must not be blank")]
    BlankField(&'static str),
    #[error("email is not a valid address")]
    InvalidEmail,
}

impl ValidationError {
    /// Field the error refers to, if any.
    #[must_use]
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::MissingField(f) | Self::BlankField(f) => Some(f),
            Self::InvalidEmail => Some("email"),
            Self::MalformedBody(_) => None,
        }
    }

    #[must_use]
    pub fn into_result<T>(self) -> OrchestratorResult<T> {
        let message = self.to_string();
        let mut error = RemoteError::new(message.clone());
        error
            .extra
            .insert("code".to_string(), Json::from("VALIDATION_ERROR"));
        if let Some(field) = self.field() {
            error.extra.insert("field".to_string(), Json::from(field));
        }
        OrchestratorResult::failure(STATUS_BAD_REQUEST, vec![error], message)
    }
}

fn parse_object(body: &[u8]) -> Result<Map<String, Json>, ValidationError> {
    match serde_json::from_slice::<Json>(body) {
        Ok(Json::Object(map)) => Ok(map),
        Ok(_) => Err(ValidationError::MalformedBody("expected a JSON object".to_string())),
        Err(e) => Err(ValidationError::MalformedBody(e.to_string())),
    }
}

/// Unwraps a GraphQL-shaped `{ "variables": { ... } }` body.
fn unwrap_variables(mut map: Map<String, Json>) -> Map<String, Json> {
    match map.remove("variables") {
        Some(Json::Object(vars)) => vars,
        Some(other) => {
            map.insert("variables".to_string(), other);
            map
        }
        None => map,
    }
}

fn string_field(map: &Map<String, Json>, name: &'static str) -> Result<String, ValidationError> {
    match map.get(name) {
        Some(Json::String(s)) => Ok(s.clone()),
        Some(Json::Null) | None => Err(ValidationError::MissingField(name)),
        Some(_) => Err(ValidationError::MalformedBody(format!("{name} must be a string"))),
    }
}

/// Reads login credentials from `{email, password}`,
/// `{loginInput: {...}}` or `{variables: {loginInput: {...}}}`.
///
/// # Errors
///
/// Returns a [`ValidationError`] for malformed JSON or invalid credentials.
pub fn credentials_from(body: &[u8]) -> Result<Credentials, ValidationError> {
    let mut map = unwrap_variables(parse_object(body)?);
    if let Some(Json::Object(input)) = map.remove("loginInput") {
        map = input;
    }
    let credentials = Credentials {
        email: string_field(&map, "email")?,
        password: string_field(&map, "password")?,
    };
    validate_credentials(&credentials)?;
    Ok(credentials)
}

/// Reads the refresh token from `{refreshToken}` or `{variables: {refreshToken}}`.
///
/// # Errors
///
/// Returns a [`ValidationError`] for malformed JSON or a missing/blank token.
pub fn refresh_token_from(body: &[u8]) -> Result<String, ValidationError> {
    let map = unwrap_variables(parse_object(body)?);
    let token = string_field(&map, "refreshToken")?;
    validate_refresh_token(&token)?;
    Ok(token)
}

/// Reads CRUD variables. An empty body means no variables.
///
/// # Errors
///
/// Returns [`ValidationError::MalformedBody`] for non-object JSON.
pub fn variables_from(body: &[u8]) -> Result<Map<String, Json>, ValidationError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    parse_object(body).map(unwrap_variables)
}

/// # Errors
///
/// Returns the first problem found with `credentials`.
pub fn validate_credentials(credentials: &Credentials) -> Result<(), ValidationError> {
    if credentials.email.trim().is_empty() {
        return Err(ValidationError::BlankField("email"));
    }
    if credentials.password.is_empty() {
        return Err(ValidationError::BlankField("password"));
    }
    if !is_plausible_email(credentials.email.trim()) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(())
}

/// # Errors
///
/// Returns [`ValidationError::BlankField`] for a blank token.
pub fn validate_refresh_token(token: &str) -> Result<(), ValidationError> {
    if token.trim().is_empty() {
        return Err(ValidationError::BlankField("refreshToken"));
    }
    Ok(())
}

fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
}
