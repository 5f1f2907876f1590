//! Gateway HTTP module with deferred startup.
//!
//! `new()` wires orchestrators onto the bus, `start()` binds the listener and
//! `serve()` accepts requests until the shutdown future resolves.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    crud_handler, health_handler, liveness_handler, login_handler, readiness_handler,
    refresh_handler, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::config::GatewayConfig;
use crate::orchestrator::{BusNotifier, CrudOrchestrator, LoginOrchestrator};
use crate::service::RemoteForwarder;
use crate::traits::MessageBus;

/// Longest wait for in-flight orchestrations after the listener closes.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Routes:
/// - `GET /health`, `/health/live`, `/health/ready`
/// - `POST /auth/login`, `/auth/refresh`
/// - `POST /api/{resource}/{action}`
pub fn build_router(config: &NetworkConfig, state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/refresh", post(refresh_handler))
        .route("/api/{resource}/{action}", post(crud_handler))
        .layer(build_http_layers(config))
        .with_state(state)
}

/// Owns the listener and the state shared by every handler.
pub struct NetworkModule {
    config: NetworkConfig,
    state: AppState,
    listener: Option<TcpListener>,
}

impl NetworkModule {
    /// Builds the forwarder and orchestrators over `bus`. Binds nothing.
    #[must_use]
    pub fn new(config: &GatewayConfig, bus: Arc<dyn MessageBus>) -> Self {
        let forwarder = Arc::new(RemoteForwarder::new(Arc::clone(&bus), &config.forwarder));

        let mut login = LoginOrchestrator::new(Arc::clone(&forwarder), config.subjects.clone());
        if config.publish_outcomes {
            login = login.with_notifier(Arc::new(BusNotifier::new(
                bus,
                config.subjects.login_outcome.clone(),
            )));
        }
        let crud = CrudOrchestrator::new(forwarder, config.subjects.clone());

        let state = AppState {
            login: Arc::new(login),
            crud: Arc::new(crud),
            session: Arc::new(config.session.clone()),
            shutdown: Arc::new(ShutdownController::new()),
            start_time: Instant::now(),
        };

        Self {
            config: config.network.clone(),
            state,
            listener: None,
        }
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.state.shutdown)
    }

    #[must_use]
    pub fn build_router(&self) -> Router {
        build_router(&self.config, self.state.clone())
    }

    /// Binds the listener and returns the bound port (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let port = listener.local_addr()?.port();
        info!(host = %self.config.host, port, "listener bound");
        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then drains in-flight orchestrations.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called or the server hits a
    /// fatal I/O error.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let router = self.build_router();
        let listener = self
            .listener
            .ok_or_else(|| anyhow!("start() must be called before serve()"))?;
        let controller = self.state.shutdown;

        let mut stopping = controller.shutdown_receiver();
        let trigger = Arc::clone(&controller);
        tokio::spawn(async move {
            shutdown.await;
            info!("shutdown requested, draining");
            trigger.trigger_shutdown();
        });

        controller.set_ready();
        info!("gateway ready");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                // Sender lives in the controller, so this only ends on shutdown.
                let _ = stopping.changed().await;
            })
            .await?;

        if controller.wait_for_drain(DRAIN_TIMEOUT).await {
            info!("in-flight orchestrations drained");
        } else {
            warn!(
                in_flight = controller.in_flight_count(),
                "drain timeout expired with orchestrations still running"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use edgeway_core::{BusReply, RemoteError};
    use serde_json::{json, Value as Json};
    use tower::ServiceExt;

    use super::*;
    use crate::bus::InMemoryBus;
    use crate::session::ACCESS_TOKEN_PLACEHOLDER;

    struct Gateway {
        bus: Arc<InMemoryBus>,
        module: NetworkModule,
    }

    fn gateway(config: &GatewayConfig) -> Gateway {
        let bus = Arc::new(InMemoryBus::recording());
        let module = NetworkModule::new(config, bus.clone());
        module.shutdown_controller().set_ready();
        Gateway { bus, module }
    }

    fn post_json(uri: &str, body: &Json) -> Request<Body> {
        Request::post(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Json {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn script_healthy_auth(bus: &InMemoryBus) {
        bus.reply_with(
            "login_request",
            BusReply::data(json!({
                "loginUser": {
                    "accessToken": "eyJ.access.T1",
                    "refreshToken": "R1",
                    "user": { "id": 1, "email": "a@b.com", "role": { "id": 1, "name": "admin" } }
                }
            })),
        );
        bus.reply_with(
            "sidebar_get_user_menu",
            BusReply::data(json!({ "getSidebarMenu": [{ "id": 1, "label": "Dashboard", "path": "/" }] })),
        );
    }

    #[tokio::test]
    async fn login_sets_cookie_and_redacts_body() {
        let gw = gateway(&GatewayConfig::default());
        script_healthy_auth(&gw.bus);

        let response = gw
            .module
            .build_router()
            .oneshot(post_json("/auth/login", &json!({ "email": "a@b.com", "password": "secret" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.starts_with("access_token=eyJ.access.T1; Path=/; HttpOnly; SameSite=Lax; Max-Age=3600"));
        assert!(response.headers().contains_key("x-request-id"));

        let body = json_body(response).await;
        assert_eq!(body["statusCode"], 200);
        assert_eq!(body["success"], true);
        assert_eq!(body["body"]["accessToken"], ACCESS_TOKEN_PLACEHOLDER);
        assert_eq!(body["body"]["refreshToken"], "R1");
        assert_eq!(body["body"]["menuItems"][0]["label"], "Dashboard");
        assert!(!body.to_string().contains("eyJ.access.T1"));
    }

    #[tokio::test]
    async fn request_id_seeds_correlation() {
        let gw = gateway(&GatewayConfig::default());
        script_healthy_auth(&gw.bus);

        let mut request = post_json(
            "/auth/login",
            &json!({ "variables": { "loginInput": { "email": "a@b.com", "password": "secret" } } }),
        );
        request
            .headers_mut()
            .insert("x-request-id", "trace-42".parse().unwrap());
        let response = gw.module.build_router().oneshot(request).await.unwrap();

        assert_eq!(response.headers()["x-request-id"], "trace-42");
        for envelope in gw.bus.requests_for("login_request") {
            assert_eq!(envelope.correlation_id(), Some("trace-42"));
        }
        assert_eq!(
            gw.bus.requests_for("sidebar_get_user_menu")[0].correlation_id(),
            Some("trace-42")
        );
    }

    #[tokio::test]
    async fn invalid_login_is_400_without_bus_traffic() {
        let gw = gateway(&GatewayConfig::default());
        let response = gw
            .module
            .build_router()
            .oneshot(post_json("/auth/login", &json!({ "email": "a@b.com" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!response.headers().contains_key(SET_COOKIE));
        let body = json_body(response).await;
        assert_eq!(body["errors"][0]["field"], "password");
        assert!(gw.bus.requests().is_empty());
    }

    #[tokio::test]
    async fn rejected_login_sets_no_cookie() {
        let gw = gateway(&GatewayConfig::default());
        gw.bus.reply_with(
            "login_request",
            BusReply::errors(vec![RemoteError::new("Invalid credentials")], None),
        );

        let response = gw
            .module
            .build_router()
            .oneshot(post_json("/auth/login", &json!({ "email": "a@b.com", "password": "nope" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(!response.headers().contains_key(SET_COOKIE));
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert!(body.get("body").is_none());
    }

    #[tokio::test]
    async fn degraded_login_still_delivers_session() {
        let gw = gateway(&GatewayConfig::default());
        script_healthy_auth(&gw.bus);
        gw.bus.remove("sidebar_get_user_menu");

        let response = gw
            .module
            .build_router()
            .oneshot(post_json("/auth/login", &json!({ "email": "a@b.com", "password": "secret" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(SET_COOKIE));
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["body"]["menuItems"], json!([]));
        assert_eq!(body["body"]["refreshToken"], "R1");
        assert!(body["errors"].as_array().is_some_and(|e| !e.is_empty()));
    }

    #[tokio::test]
    async fn refresh_rotates_and_resets_cookie() {
        let gw = gateway(&GatewayConfig::default());
        gw.bus.reply_with(
            "refresh_token_request",
            BusReply::data(json!({
                "accessToken": "T2",
                "refreshToken": "R2",
                "accessTokenExpiresIn": 900,
                "user": { "id": 1, "email": "a@b.com" },
                "menuItems": []
            })),
        );

        let response = gw
            .module
            .build_router()
            .oneshot(post_json("/auth/refresh", &json!({ "variables": { "refreshToken": "R1" } })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.contains("access_token=T2;"));
        assert!(cookie.contains("Max-Age=900"));
        let body = json_body(response).await;
        assert_eq!(body["body"]["refreshToken"], "R2");
    }

    #[tokio::test]
    async fn crud_forwards_cookie_credential_and_projects() {
        let gw = gateway(&GatewayConfig::default());
        gw.bus.reply_with(
            "graphql_request",
            BusReply::data(json!({ "findAllRoles": { "items": [], "totalItems": 0 } })),
        );

        let mut request = post_json(
            "/api/roles/findAllRoles",
            &json!({ "paginationInput": { "page": 1, "limit": 10 } }),
        );
        request
            .headers_mut()
            .insert(COOKIE, "access_token=T1".parse().unwrap());
        let response = gw.module.build_router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["body"]["totalItems"], 0);

        let sent = gw.bus.requests_for("graphql_request");
        assert_eq!(sent[0].authorization(), Some("Bearer T1"));
        assert_eq!(sent[0].variables["paginationInput"]["limit"], 10);
    }

    #[tokio::test]
    async fn crud_prefers_authorization_header() {
        let gw = gateway(&GatewayConfig::default());
        gw.bus.reply_with(
            "sidebar_graphql_request",
            BusReply::data(json!({ "removeMenuItem": { "id": 3, "label": "Old" } })),
        );

        let mut request = post_json("/api/menu-items/removeMenuItem", &json!({ "id": 3 }));
        request
            .headers_mut()
            .insert(AUTHORIZATION, "Bearer H1".parse().unwrap());
        request
            .headers_mut()
            .insert(COOKIE, "access_token=C1".parse().unwrap());
        let response = gw.module.build_router().oneshot(request).await.unwrap();

        let body = json_body(response).await;
        assert_eq!(body["body"], true);
        assert_eq!(
            gw.bus.requests_for("sidebar_graphql_request")[0].authorization(),
            Some("Bearer H1")
        );
    }

    #[tokio::test]
    async fn unknown_crud_operation_is_404() {
        let gw = gateway(&GatewayConfig::default());
        let response = gw
            .module
            .build_router()
            .oneshot(post_json("/api/roles/dropEverything", &json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(gw.bus.requests().is_empty());
    }

    #[tokio::test]
    async fn draining_gateway_rejects_new_work() {
        let gw = gateway(&GatewayConfig::default());
        gw.module.shutdown_controller().trigger_shutdown();

        let response = gw
            .module
            .build_router()
            .oneshot(post_json("/auth/login", &json!({ "email": "a@b.com", "password": "secret" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(gw.bus.requests().is_empty());
    }

    #[tokio::test]
    async fn health_checks_follow_state() {
        let bus = Arc::new(InMemoryBus::recording());
        let module = NetworkModule::new(&GatewayConfig::default(), bus);
        let router = module.build_router();

        let ready = router
            .clone()
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);

        module.shutdown_controller().set_ready();
        let ready = router
            .clone()
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(ready.status(), StatusCode::OK);

        let live = router
            .clone()
            .oneshot(Request::get("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(live.status(), StatusCode::OK);

        let health = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(health).await;
        assert_eq!(body["state"], "ready");
        assert_eq!(body["in_flight"], 0);
    }

    #[tokio::test]
    async fn outcomes_published_when_enabled() {
        let config = GatewayConfig {
            publish_outcomes: true,
            ..GatewayConfig::default()
        };
        let gw = gateway(&config);
        script_healthy_auth(&gw.bus);

        let _ = gw
            .module
            .build_router()
            .oneshot(post_json("/auth/login", &json!({ "email": "a@b.com", "password": "secret" })))
            .await
            .unwrap();

        for _ in 0..100 {
            if !gw.bus.published().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        let published = gw.bus.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "auth.login.outcome");
        assert_eq!(published[0].1["outcome"], "success");
    }

    #[tokio::test]
    async fn rejected_payloads_are_published_as_failures() {
        let config = GatewayConfig {
            publish_outcomes: true,
            ..GatewayConfig::default()
        };
        let gw = gateway(&config);
        let router = gw.module.build_router();

        let response = router
            .clone()
            .oneshot(post_json("/auth/login", &json!({ "email": "a@b.com" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = router
            .oneshot(post_json("/auth/refresh", &json!({ "refreshToken": "  " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        for _ in 0..100 {
            if gw.bus.published().len() == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        let published = gw.bus.published();
        assert_eq!(published.len(), 2);
        assert!(published.iter().all(|(_, event)| event["outcome"] == "failed"));
        assert!(published.iter().all(|(_, event)| event["statusCode"] == 400));
        assert!(gw.bus.requests().is_empty());
    }

    #[tokio::test]
    async fn undeliverable_cookie_is_500_not_a_silent_drop() {
        let config = GatewayConfig {
            session: crate::session::SessionConfig {
                cookie_name: "access\ntoken".into(),
                ..crate::session::SessionConfig::default()
            },
            ..GatewayConfig::default()
        };
        let gw = gateway(&config);
        script_healthy_auth(&gw.bus);

        let response = gw
            .module
            .build_router()
            .oneshot(post_json("/auth/login", &json!({ "email": "a@b.com", "password": "secret" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!response.headers().contains_key(SET_COOKIE));
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert!(body["body"].is_null());
        assert!(!body.to_string().contains(ACCESS_TOKEN_PLACEHOLDER));
    }

    #[tokio::test]
    async fn start_binds_os_assigned_port() {
        let mut config = GatewayConfig::default();
        config.network.host = "127.0.0.1".to_string();
        config.network.port = 0;
        let mut module = NetworkModule::new(&config, Arc::new(InMemoryBus::recording()));
        let port = module.start().await.unwrap();
        assert!(port > 0);
    }

    #[tokio::test]
    async fn serve_requires_start() {
        let module = NetworkModule::new(&GatewayConfig::default(), Arc::new(InMemoryBus::recording()));
        let err = module.serve(std::future::pending::<()>()).await.unwrap_err();
        assert!(err.to_string().contains("start()"));
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown_signal() {
        let mut config = GatewayConfig::default();
        config.network.host = "127.0.0.1".to_string();
        config.network.port = 0;
        let mut module = NetworkModule::new(&config, Arc::new(InMemoryBus::recording()));
        module.start().await.unwrap();
        let controller = module.shutdown_controller();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(module.serve(async move {
            let _ = rx.await;
        }));
        tokio::task::yield_now().await;
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(controller.health_state(), crate::network::HealthState::Stopped);
    }
}
