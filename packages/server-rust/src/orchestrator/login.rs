//! Login and token-refresh composition.
//!
//! Both flows run the same two-step state machine:
//!
//! ```text
//! Start -> Authenticating -> AuthFailed                      (terminal)
//!                         -> Authenticated -> FetchingMenu -> MenuFailed -> Done
//!                                                          -> MenuOk     -> Done
//! ```
//!
//! Authentication failures end the flow without a session. A menu failure of
//! any kind degrades the result (`success: false`, empty menu) but keeps the
//! tokens and user already obtained.

use std::sync::Arc;

use chrono::Utc;
use edgeway_core::result::{
    STATUS_GATEWAY_TIMEOUT, STATUS_INTERNAL_ERROR, STATUS_OK, STATUS_UNAUTHORIZED,
};
use edgeway_core::{
    token_preview, CorrelationContext, Credentials, MenuItem, OrchestratorResult, RemoteError,
    Session, User, Value,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::notify::{AuthFlow, AuthOutcome, AuthOutcomeEvent, NoopNotifier};
use crate::config::SubjectConfig;
use crate::service::{ForwardRequest, RemoteForwarder};
use crate::traits::OutcomeNotifier;
use crate::session::is_cookie_value;
use crate::validation::{validate_credentials, validate_refresh_token, ValidationError};

/// Message on every result where authentication did not succeed.
pub const AUTH_FAILED_MESSAGE: &str = "invalid credentials or auth-service error";
/// Message on a session issued without its navigation menu.
pub const MENU_DEGRADED_MESSAGE: &str = "authenticated, but the navigation menu could not be loaded";

const LOGIN_MUTATION: &str = r"
  mutation LoginUser($loginInput: LoginInput!) {
    loginUser(loginInput: $loginInput) {
      accessToken
      refreshToken
      accessTokenExpiresIn
      refreshTokenExpiresIn
      user {
        id
        email
        name
        lastName
        isActive
        avatarUrl
        role { id name permissions { id name } }
      }
    }
  }
";

const REFRESH_MUTATION: &str = r"
  mutation RefreshToken($refreshToken: String!) {
    refreshToken(refreshToken: $refreshToken) {
      accessToken
      refreshToken
      accessTokenExpiresIn
      refreshTokenExpiresIn
      user {
        id
        email
        name
        lastName
        isActive
        avatarUrl
        role { id name permissions { id name } }
      }
    }
  }
";

const SIDEBAR_MENU_QUERY: &str = r"
  query GetSidebarMenu {
    getSidebarMenu {
      id
      label
      path
      icon
      order
      children {
        id
        label
        path
        icon
        children { id label path icon }
      }
    }
  }
";

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Orchestration phase. Transitions are logged at debug level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Authenticating,
    AuthFailed,
    Authenticated,
    FetchingMenu,
    MenuFailed,
    MenuOk,
    Done,
}

impl Phase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Authenticating => "authenticating",
            Self::AuthFailed => "auth_failed",
            Self::Authenticated => "authenticated",
            Self::FetchingMenu => "fetching_menu",
            Self::MenuFailed => "menu_failed",
            Self::MenuOk => "menu_ok",
            Self::Done => "done",
        }
    }

    /// Whether `self -> next` is an edge of the state machine.
    #[must_use]
    pub fn can_advance_to(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Self::Start, Self::Authenticating)
                | (Self::Authenticating, Self::AuthFailed | Self::Authenticated)
                | (Self::Authenticated, Self::FetchingMenu | Self::MenuOk)
                | (Self::FetchingMenu, Self::MenuFailed | Self::MenuOk)
                | (Self::MenuFailed | Self::MenuOk, Self::Done)
        )
    }
}

/// Tracks and logs the phase of one flow.
struct Transitions<'a> {
    correlation_id: &'a str,
    flow: AuthFlow,
    phase: Phase,
}

impl<'a> Transitions<'a> {
    fn start(correlation_id: &'a str, flow: AuthFlow) -> Self {
        Self {
            correlation_id,
            flow,
            phase: Phase::Start,
        }
    }

    fn advance(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal transition {:?} -> {next:?}",
            self.phase
        );
        debug!(
            correlation_id = self.correlation_id,
            flow = ?self.flow,
            from = self.phase.as_str(),
            to = next.as_str(),
            "auth phase transition"
        );
        self.phase = next;
    }
}

// ---------------------------------------------------------------------------
// Failure taxonomy
// ---------------------------------------------------------------------------

/// Why authentication produced no session.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials {
        status_code: u16,
        errors: Vec<RemoteError>,
    },
    #[error("authentication service timed out")]
    UpstreamTimeout { errors: Vec<RemoteError> },
    #[error("authentication service error")]
    UpstreamError {
        status_code: u16,
        errors: Vec<RemoteError>,
    },
    #[error("incomplete reply from authentication service: {reason}")]
    IncompleteUpstreamReply { reason: String },
}

impl AuthError {
    /// Classifies a failed forwarder result from the authentication step.
    fn from_failure(result: OrchestratorResult<Value>) -> Self {
        let status_code = result.status_code;
        let mut errors = result.errors.unwrap_or_default();
        if errors.is_empty() {
            errors.push(RemoteError::new(
                result.message.unwrap_or_else(|| AUTH_FAILED_MESSAGE.to_string()),
            ));
        }
        match status_code {
            STATUS_GATEWAY_TIMEOUT => Self::UpstreamTimeout { errors },
            s if s >= STATUS_INTERNAL_ERROR => Self::UpstreamError {
                status_code: s,
                errors,
            },
            s => Self::InvalidCredentials {
                status_code: if (400..500).contains(&s) {
                    s
                } else {
                    STATUS_UNAUTHORIZED
                },
                errors,
            },
        }
    }

    fn incomplete(reason: impl Into<String>) -> Self {
        Self::IncompleteUpstreamReply {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidCredentials { status_code, .. }
            | Self::UpstreamError { status_code, .. } => *status_code,
            Self::UpstreamTimeout { .. } => STATUS_GATEWAY_TIMEOUT,
            Self::IncompleteUpstreamReply { .. } => STATUS_INTERNAL_ERROR,
        }
    }

    fn into_result(self) -> OrchestratorResult<Session> {
        let status = self.status_code();
        let summary = self.to_string();
        match self {
            Self::InvalidCredentials { errors, .. }
            | Self::UpstreamTimeout { errors }
            | Self::UpstreamError { errors, .. } => {
                OrchestratorResult::failure(status, errors, AUTH_FAILED_MESSAGE)
            }
            Self::IncompleteUpstreamReply { .. } => {
                OrchestratorResult::failure(status, vec![RemoteError::new(summary.clone())], summary)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Reply parsing
// ---------------------------------------------------------------------------

/// Fields the authentication step reads from its reply.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthPayload {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<serde_json::Value>,
    #[serde(default)]
    user: Option<serde_json::Value>,
    #[serde(default)]
    menu_items: Option<serde_json::Value>,
    #[serde(default)]
    access_token_expires_in: Option<u64>,
    #[serde(default)]
    refresh_token_expires_in: Option<u64>,
}

fn non_blank(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.trim().is_empty())
}

/// Reads the auth payload, unwrapping the mutation's root field when present.
fn auth_payload(body: Value, root_field: &str) -> Result<AuthPayload, AuthError> {
    let mut body = body;
    let payload = match body.take(root_field) {
        Some(inner @ Value::Map(_)) => inner,
        Some(other) => {
            // A string root field is the flat reply's own token, not a wrapper.
            if let Value::Map(map) = &mut body {
                map.insert(root_field.to_string(), other);
            }
            body
        }
        None => body,
    };
    if !matches!(payload, Value::Map(_)) {
        return Ok(AuthPayload::default());
    }
    payload
        .decode()
        .map_err(|e| AuthError::incomplete(format!("unreadable authentication reply: {e}")))
}

/// Validates the token pair and user, producing a session without menu.
fn session_from(payload: AuthPayload) -> Result<(Session, Option<serde_json::Value>), AuthError> {
    let refresh = match payload.refresh_token {
        Some(serde_json::Value::String(s)) => Some(s),
        _ => None,
    };
    let (access_token, refresh_token) = match (non_blank(payload.access_token), non_blank(refresh)) {
        (Some(access), Some(refresh)) => (access, refresh),
        (None, None) => {
            return Err(AuthError::InvalidCredentials {
                status_code: STATUS_UNAUTHORIZED,
                errors: vec![RemoteError::new("authentication reply carried no credentials")],
            })
        }
        _ => {
            return Err(AuthError::incomplete(
                "reply carried only one of access and refresh token",
            ))
        }
    };
    if !is_cookie_value(&access_token) {
        return Err(AuthError::incomplete("access token is not a valid cookie value"));
    }
    let user: User = match payload.user {
        Some(serde_json::Value::Null) | None => {
            return Err(AuthError::incomplete("reply carried no user"))
        }
        Some(raw) => serde_json::from_value(raw)
            .map_err(|e| AuthError::incomplete(format!("unreadable user: {e}")))?,
    };

    let session = Session {
        access_token,
        refresh_token,
        user,
        menu_items: None,
        access_token_expires_in: payload.access_token_expires_in,
        refresh_token_expires_in: payload.refresh_token_expires_in,
    };
    Ok((session, payload.menu_items))
}

/// Reads menu items from `getSidebarMenu`, `menuItems` or a bare array.
fn menu_from(body: Value) -> Result<Vec<MenuItem>, String> {
    let mut body = body;
    let items = if matches!(body, Value::Array(_)) {
        body
    } else {
        body.take("getSidebarMenu")
            .or_else(|| body.take("menuItems"))
            .ok_or_else(|| "menu reply carried no items".to_string())?
    };
    if items.is_null() {
        return Err("menu reply carried no items".to_string());
    }
    items
        .decode()
        .map_err(|e| format!("unreadable menu reply: {e}"))
}

// ---------------------------------------------------------------------------
// LoginOrchestrator
// ---------------------------------------------------------------------------

/// Composes authentication and menu retrieval into one session result.
pub struct LoginOrchestrator {
    forwarder: Arc<RemoteForwarder>,
    subjects: SubjectConfig,
    notifier: Arc<dyn OutcomeNotifier>,
}

impl LoginOrchestrator {
    #[must_use]
    pub fn new(forwarder: Arc<RemoteForwarder>, subjects: SubjectConfig) -> Self {
        Self {
            forwarder,
            subjects,
            notifier: Arc::new(NoopNotifier),
        }
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn OutcomeNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Authenticates `credentials`, then loads the user's menu best-effort.
    pub async fn login(
        &self,
        credentials: &Credentials,
        ctx: &CorrelationContext,
    ) -> OrchestratorResult<Session> {
        info!(correlation_id = ctx.id(), "login orchestration started");
        if let Err(e) = validate_credentials(credentials) {
            return self.reject(AuthFlow::Login, e, ctx);
        }

        let request = ForwardRequest::new(&self.subjects.login, "loginUser", LOGIN_MUTATION)
            .variable(
                "loginInput",
                json!({ "email": credentials.email, "password": credentials.password }),
            )
            .domain_error_status(STATUS_UNAUTHORIZED);

        self.run(AuthFlow::Login, ctx, request, "loginUser", None)
            .await
    }

    /// Exchanges `refresh_token` for a rotated token pair.
    ///
    /// The menu step is skipped when the refresh reply already carries menu items.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        ctx: &CorrelationContext,
    ) -> OrchestratorResult<Session> {
        info!(
            correlation_id = ctx.id(),
            refresh_token = %token_preview(refresh_token),
            "refresh orchestration started"
        );
        if let Err(e) = validate_refresh_token(refresh_token) {
            return self.reject(AuthFlow::Refresh, e, ctx);
        }

        let request = ForwardRequest::new(&self.subjects.refresh, "refreshToken", REFRESH_MUTATION)
            .variable("refreshToken", json!(refresh_token))
            .domain_error_status(STATUS_UNAUTHORIZED);

        self.run(AuthFlow::Refresh, ctx, request, "refreshToken", Some(refresh_token))
            .await
    }

    /// Fails `flow` on input rejected before any remote call and reports the
    /// outcome. Used for payloads that never become credentials at all.
    pub fn reject(
        &self,
        flow: AuthFlow,
        error: ValidationError,
        ctx: &CorrelationContext,
    ) -> OrchestratorResult<Session> {
        warn!(correlation_id = ctx.id(), ?flow, error = %error, "rejected before any remote call");
        let result = error.into_result();
        self.emit(flow, AuthOutcome::Failed, ctx, result.status_code, None);
        result
    }

    async fn run(
        &self,
        flow: AuthFlow,
        ctx: &CorrelationContext,
        request: ForwardRequest,
        root_field: &str,
        supplied_refresh: Option<&str>,
    ) -> OrchestratorResult<Session> {
        let mut phase = Transitions::start(ctx.id(), flow);

        phase.advance(Phase::Authenticating);
        let (mut session, reply_menu) =
            match self.authenticate(ctx, request, root_field, supplied_refresh).await {
                Ok(parts) => parts,
                Err(e) => {
                    phase.advance(Phase::AuthFailed);
                    error!(
                        correlation_id = ctx.id(),
                        flow = ?flow,
                        status_code = e.status_code(),
                        error = %e,
                        "authentication failed"
                    );
                    let result = e.into_result();
                    self.emit(flow, AuthOutcome::Failed, ctx, result.status_code, None);
                    return result;
                }
            };
        phase.advance(Phase::Authenticated);
        debug!(
            correlation_id = ctx.id(),
            access_token = %token_preview(&session.access_token),
            refresh_token = %token_preview(&session.refresh_token),
            user_id = %session.user.id,
            "tokens issued"
        );

        let reply_menu = reply_menu
            .filter(|m| !m.is_null())
            .and_then(|m| serde_json::from_value::<Vec<MenuItem>>(m).ok());

        let menu = if let Some(items) = reply_menu {
            debug!(correlation_id = ctx.id(), "menu supplied with authentication reply");
            Ok(items)
        } else {
            phase.advance(Phase::FetchingMenu);
            self.fetch_menu(ctx, &session).await
        };

        let user_id = Some(session.user.id.to_string());
        let result = match menu {
            Ok(items) => {
                phase.advance(Phase::MenuOk);
                session.menu_items = Some(items);
                let message = match flow {
                    AuthFlow::Login => "login successful",
                    AuthFlow::Refresh => "token refreshed",
                };
                OrchestratorResult::ok(session)
                    .with_message(message)
                    .with_success(true)
            }
            Err(errors) => {
                phase.advance(Phase::MenuFailed);
                warn!(
                    correlation_id = ctx.id(),
                    error = errors.first().map_or("", |e| e.message.as_str()),
                    "menu fetch failed; returning degraded session"
                );
                session.menu_items = Some(Vec::new());
                OrchestratorResult {
                    status_code: STATUS_OK,
                    body: Some(session),
                    errors: Some(errors),
                    message: Some(MENU_DEGRADED_MESSAGE.to_string()),
                    success: Some(false),
                }
            }
        };
        phase.advance(Phase::Done);

        let outcome = if result.success == Some(true) {
            AuthOutcome::Success
        } else {
            AuthOutcome::Degraded
        };
        info!(
            correlation_id = ctx.id(),
            flow = ?flow,
            outcome = ?outcome,
            "auth orchestration complete"
        );
        self.emit(flow, outcome, ctx, result.status_code, user_id);
        result
    }

    async fn authenticate(
        &self,
        ctx: &CorrelationContext,
        request: ForwardRequest,
        root_field: &str,
        supplied_refresh: Option<&str>,
    ) -> Result<(Session, Option<serde_json::Value>), AuthError> {
        let result = self.forwarder.forward(ctx, request).await;
        if !result.is_success() {
            return Err(AuthError::from_failure(result));
        }
        let payload = auth_payload(result.body.unwrap_or_default(), root_field)?;
        let (session, menu) = session_from(payload)?;

        if supplied_refresh == Some(session.refresh_token.as_str()) {
            return Err(AuthError::incomplete("refresh token was not rotated"));
        }
        Ok((session, menu))
    }

    /// Fetches the menu with the freshly issued access token.
    async fn fetch_menu(
        &self,
        ctx: &CorrelationContext,
        session: &Session,
    ) -> Result<Vec<MenuItem>, Vec<RemoteError>> {
        let menu_ctx = CorrelationContext::new(ctx.id()).with_bearer(session.access_token.clone());
        let request = ForwardRequest::new(&self.subjects.menu, "getSidebarMenu", SIDEBAR_MENU_QUERY)
            .variable("userId", json!(session.user.id))
            .domain_error_status(STATUS_INTERNAL_ERROR);

        let result = self.forwarder.forward(&menu_ctx, request).await;
        if !result.is_success() {
            let mut errors = result.errors.unwrap_or_default();
            if errors.is_empty() {
                errors.push(RemoteError::new(
                    result.message.unwrap_or_else(|| "menu service error".to_string()),
                ));
            }
            return Err(errors);
        }
        menu_from(result.body.unwrap_or_default()).map_err(|reason| vec![RemoteError::new(reason)])
    }

    fn emit(
        &self,
        flow: AuthFlow,
        outcome: AuthOutcome,
        ctx: &CorrelationContext,
        status_code: u16,
        user_id: Option<String>,
    ) {
        self.notifier.notify(AuthOutcomeEvent {
            flow,
            outcome,
            correlation_id: ctx.id().to_string(),
            status_code,
            user_id,
            at: Utc::now(),
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
