//! Gateway configuration and its command-line / environment front end.

use std::time::Duration;

use clap::Parser;

use crate::network::NetworkConfig;
use crate::service::ForwarderConfig;
use crate::session::SessionConfig;
use crate::telemetry::LogFormat;

/// Bus subjects each orchestration sends on.
#[derive(Debug, Clone)]
pub struct SubjectConfig {
    pub login: String,
    pub refresh: String,
    pub menu: String,
    /// Generic query/command subject for the role, permission and user backends.
    pub graphql: String,
    /// Generic query/command subject for the navigation backend.
    pub sidebar_graphql: String,
    /// Published login/refresh outcome events.
    pub login_outcome: String,
}

impl Default for SubjectConfig {
    fn default() -> Self {
        Self {
            login: "login_request".to_string(),
            refresh: "refresh_token_request".to_string(),
            menu: "sidebar_get_user_menu".to_string(),
            graphql: "graphql_request".to_string(),
            sidebar_graphql: "sidebar_graphql_request".to_string(),
            login_outcome: "auth.login.outcome".to_string(),
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub network: NetworkConfig,
    pub forwarder: ForwarderConfig,
    pub session: SessionConfig,
    pub subjects: SubjectConfig,
    /// Publish login/refresh outcomes on `subjects.login_outcome`.
    pub publish_outcomes: bool,
}

impl GatewayConfig {
    /// Rejects configurations that could never serve a request.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.forwarder.call_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "call_timeout_ms",
            });
        }
        if self.forwarder.max_concurrent_calls == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.network.request_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "request_timeout",
            });
        }
        if self.session.cookie_name.trim().is_empty() {
            return Err(ConfigError::EmptyCookieName);
        }
        if let Some(origin) = self
            .network
            .cors_origins
            .iter()
            .find(|o| o.as_str() != "*" && o.parse::<axum::http::HeaderValue>().is_err())
        {
            return Err(ConfigError::InvalidCorsOrigin(origin.clone()));
        }
        Ok(())
    }
}

/// Invalid configuration values.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
    #[error("max_concurrent_calls must be greater than zero")]
    ZeroConcurrency,
    #[error("session cookie name must not be empty")]
    EmptyCookieName,
    #[error("invalid CORS origin: {0}")]
    InvalidCorsOrigin(String),
}

/// Command-line arguments, each overridable from the environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "edgeway", about = "Edge orchestration gateway", version)]
pub struct Cli {
    /// Bind address.
    #[arg(long, env = "EDGEWAY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Listen port. 0 picks a free port.
    #[arg(long, env = "EDGEWAY_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Allowed CORS origins, comma separated. `*` allows any.
    #[arg(long, env = "EDGEWAY_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,

    /// Bound on every single bus round-trip.
    #[arg(long, env = "EDGEWAY_CALL_TIMEOUT_MS", default_value_t = 10_000)]
    pub call_timeout_ms: u64,

    /// Concurrent remote calls before load shedding.
    #[arg(long, env = "EDGEWAY_MAX_CONCURRENT_CALLS", default_value_t = 1000)]
    pub max_concurrent_calls: u32,

    /// Overall HTTP request timeout.
    #[arg(long, env = "EDGEWAY_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Mark the access cookie `Secure`.
    #[arg(long, env = "EDGEWAY_SECURE_COOKIES")]
    pub secure_cookies: bool,

    /// Publish login/refresh outcome events on the bus.
    #[arg(long, env = "EDGEWAY_PUBLISH_OUTCOMES")]
    pub publish_outcomes: bool,

    /// Log output format.
    #[arg(long, env = "EDGEWAY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Log filter directives. Defaults to `info`.
    #[arg(long, env = "RUST_LOG")]
    pub log_filter: Option<String>,
}

impl Cli {
    /// Converts parsed arguments into a validated [`GatewayConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any value is out of range.
    pub fn into_config(self) -> Result<GatewayConfig, ConfigError> {
        let config = GatewayConfig {
            network: NetworkConfig {
                host: self.host,
                port: self.port,
                cors_origins: self.cors_origins,
                request_timeout: Duration::from_secs(self.request_timeout_secs),
            },
            forwarder: ForwarderConfig {
                call_timeout_ms: self.call_timeout_ms,
                max_concurrent_calls: self.max_concurrent_calls,
            },
            session: SessionConfig {
                secure: self.secure_cookies,
                ..SessionConfig::default()
            },
            subjects: SubjectConfig::default(),
            publish_outcomes: self.publish_outcomes,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(GatewayConfig::default().validate(), Ok(()));
    }

    #[test]
    fn default_subjects() {
        let subjects = SubjectConfig::default();
        assert_eq!(subjects.login, "login_request");
        assert_eq!(subjects.menu, "sidebar_get_user_menu");
        assert_eq!(subjects.graphql, "graphql_request");
        assert_eq!(subjects.sidebar_graphql, "sidebar_graphql_request");
    }

    #[test]
    fn zero_call_timeout_is_rejected() {
        let mut config = GatewayConfig::default();
        config.forwarder.call_timeout_ms = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroDuration {
                field: "call_timeout_ms"
            })
        );
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = GatewayConfig::default();
        config.forwarder.max_concurrent_calls = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroConcurrency));
    }

    #[test]
    fn bad_cors_origin_is_rejected() {
        let mut config = GatewayConfig::default();
        config.network.cors_origins = vec!["http://ok.example".into(), "bad\norigin".into()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCorsOrigin(_))
        ));
    }

    #[test]
    fn cli_flags_build_config() {
        let cli = Cli::try_parse_from([
            "edgeway",
            "--port",
            "8081",
            "--cors-origins",
            "http://a.example,http://b.example",
            "--call-timeout-ms",
            "2500",
            "--secure-cookies",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);

        let config = cli.into_config().unwrap();
        assert_eq!(config.network.port, 8081);
        assert_eq!(config.network.cors_origins.len(), 2);
        assert_eq!(config.forwarder.call_timeout_ms, 2500);
        assert!(config.session.secure);
        assert_eq!(config.session.cookie_name, "access_token");
    }

    #[test]
    fn cli_rejects_zero_timeout() {
        let cli = Cli::try_parse_from(["edgeway", "--call-timeout-ms", "0"]).unwrap();
        assert!(cli.into_config().is_err());
    }
}
