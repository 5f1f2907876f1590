//! Session delivery: splits an issued session into an HTTP-only access cookie
//! and a response body that never contains the access token.

use chrono::{DateTime, Duration, Utc};
use edgeway_core::{MenuItem, Session, User};
use serde::Serialize;
use thiserror::Error;

/// Stands in for the access token in every response body.
pub const ACCESS_TOKEN_PLACEHOLDER: &str = "HIDDEN_IN_HTTP_ONLY_COOKIE";

/// Cookie attributes for the access credential.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub cookie_name: String,
    /// Cookie lifetime used when the auth backend reports no expiry.
    pub default_expires_in_secs: u64,
    /// Adds the `Secure` attribute. Enable whenever served over HTTPS.
    pub secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "access_token".to_string(),
            default_expires_in_secs: 3600,
            secure: false,
        }
    }
}

/// Body half of a delivered session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBody {
    /// Always [`ACCESS_TOKEN_PLACEHOLDER`].
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
    pub menu_items: Vec<MenuItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_expires_in: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("access token is not a valid cookie value")]
    UnsafeAccessToken,
}

/// True when `value` is a non-empty run of RFC 6265 cookie octets: visible
/// ASCII other than whitespace, `"`, `,`, `;` and the backslash.
#[must_use]
pub fn is_cookie_value(value: &str) -> bool {
    !value.is_empty()
        && value
            .bytes()
            .all(|b| matches!(b, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E))
}

/// A session ready to be written to the transport.
#[derive(Debug, Clone)]
pub struct SessionDelivery {
    /// Value for the `Set-Cookie` response header.
    pub set_cookie: String,
    pub body: SessionBody,
}

/// Splits `session` into the access cookie and the redacted body.
///
/// The cookie expires `access_token_expires_in` seconds after `now`, or after
/// the configured default when the backend did not report one.
///
/// # Errors
///
/// Returns [`SessionError::UnsafeAccessToken`] when the access token cannot be
/// carried in a cookie without altering its attributes.
pub fn deliver(
    session: Session,
    config: &SessionConfig,
    now: DateTime<Utc>,
) -> Result<SessionDelivery, SessionError> {
    if !is_cookie_value(&session.access_token) {
        return Err(SessionError::UnsafeAccessToken);
    }
    let expires_in = session
        .access_token_expires_in
        .unwrap_or(config.default_expires_in_secs);
    let set_cookie = access_cookie(config, &session.access_token, expires_in, now);

    Ok(SessionDelivery {
        set_cookie,
        body: SessionBody {
            access_token: ACCESS_TOKEN_PLACEHOLDER.to_string(),
            refresh_token: session.refresh_token,
            user: session.user,
            menu_items: session.menu_items.unwrap_or_default(),
            access_token_expires_in: session.access_token_expires_in,
            refresh_token_expires_in: session.refresh_token_expires_in,
        },
    })
}

fn access_cookie(config: &SessionConfig, token: &str, expires_in: u64, now: DateTime<Utc>) -> String {
    let seconds = i64::try_from(expires_in).unwrap_or(i64::MAX);
    let expires = Duration::try_seconds(seconds)
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    let mut cookie = format!(
        "{}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={expires_in}; Expires={}",
        config.cookie_name,
        expires.format("%a, %d %b %Y %H:%M:%S GMT"),
    );
    if config.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Extracts the named cookie's value from a `Cookie` request header.
#[must_use]
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}
