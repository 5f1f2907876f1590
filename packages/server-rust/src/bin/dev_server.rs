//! edgeway-dev-server: the gateway over an in-process bus with stub backends.
//!
//! Lets the HTTP surface be exercised end to end without any real services.
//! Log in as any email with password `password`.
//!
//! ```text
//! curl -i localhost:3000/auth/login -d '{"email":"dev@edgeway.local","password":"password"}'
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use clap::Parser;
use edgeway_core::{BusReply, RemoteError, RemoteRequestEnvelope};
use edgeway_server::bus::InMemoryBus;
use edgeway_server::telemetry::init_tracing;
use edgeway_server::{Cli, NetworkModule, SubjectConfig};
use serde_json::{json, Value as Json};
use tracing::info;

const DEV_PASSWORD: &str = "password";

static TOKEN_SEQ: AtomicU64 = AtomicU64::new(1);

fn issue_tokens(email: &str) -> Json {
    let n = TOKEN_SEQ.fetch_add(1, Ordering::Relaxed);
    json!({
        "accessToken": format!("dev-access-{n}"),
        "refreshToken": format!("dev-refresh-{n}"),
        "accessTokenExpiresIn": 900,
        "refreshTokenExpiresIn": 604_800,
        "user": {
            "id": 1,
            "email": email,
            "name": "Dev",
            "lastName": "User",
            "isActive": true,
            "createdAt": "2025-01-01T00:00:00.000Z",
            "role": {
                "id": 1,
                "name": "admin",
                "permissions": [
                    { "id": 1, "name": "roles:manage" },
                    { "id": 2, "name": "users:manage" }
                ]
            }
        }
    })
}

fn unauthorized(message: &str) -> BusReply {
    BusReply::errors(vec![RemoteError::new(message)], Some(401))
}

fn login(envelope: &RemoteRequestEnvelope) -> BusReply {
    let input = &envelope.variables.get("loginInput").cloned().unwrap_or_default();
    match (input["email"].as_str(), input["password"].as_str()) {
        (Some(email), Some(DEV_PASSWORD)) => BusReply::data(json!({ "loginUser": issue_tokens(email) })),
        _ => unauthorized("Invalid credentials"),
    }
}

fn refresh(envelope: &RemoteRequestEnvelope) -> BusReply {
    match envelope.variables.get("refreshToken").and_then(Json::as_str) {
        Some(token) if token.starts_with("dev-refresh-") => {
            BusReply::data(json!({ "refreshToken": issue_tokens("dev@edgeway.local") }))
        }
        _ => unauthorized("Refresh token expired or unknown"),
    }
}

fn menu(envelope: &RemoteRequestEnvelope) -> BusReply {
    if envelope.authorization().is_none() {
        return unauthorized("Missing bearer token");
    }
    BusReply::data(json!({
        "getSidebarMenu": [
            { "id": 1, "label": "Dashboard", "path": "/", "icon": "home" },
            {
                "id": 2,
                "label": "Administration",
                "icon": "settings",
                "children": [
                    { "id": 3, "label": "Roles", "path": "/admin/roles" },
                    { "id": 4, "label": "Permissions", "path": "/admin/permissions" },
                    { "id": 5, "label": "Users", "path": "/admin/users" }
                ]
            }
        ]
    }))
}

/// Answers any catalogued CRUD operation with a plausible shape.
fn crud(envelope: &RemoteRequestEnvelope) -> BusReply {
    if envelope.authorization().is_none() {
        return unauthorized("Missing bearer token");
    }
    let op = envelope.operation.as_str();
    let result = if op.starts_with("remove") {
        json!(true)
    } else if (op.starts_with("findAll") && op != "findAllMenuItems") || op == "searchUsers" {
        json!({ "items": [], "totalItems": 0, "totalPages": 0, "currentPage": 1, "itemsPerPage": 10 })
    } else if op.ends_with("MenuItems") || op == "findActiveMenuItemsForAdmin" {
        json!([])
    } else {
        // Echo the input object back as the stored entity.
        let mut entity = envelope
            .variables
            .values()
            .find(|v| v.is_object())
            .cloned()
            .unwrap_or_else(|| json!({}));
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        if let Some(map) = entity.as_object_mut() {
            let id = envelope.variables.get("id").cloned().unwrap_or_else(|| json!(1));
            map.entry("id").or_insert(id);
            map.entry("name").or_insert_with(|| json!("dev"));
            map.insert("createdAt".to_string(), json!(now));
            map.insert("updatedAt".to_string(), json!(now));
        }
        entity
    };
    let mut data = serde_json::Map::new();
    data.insert(op.to_string(), result);
    BusReply::data(Json::Object(data))
}

fn stub_backends(bus: &InMemoryBus, subjects: &SubjectConfig) {
    bus.on(&subjects.login, |envelope| async move { Ok(login(&envelope)) });
    bus.on(&subjects.refresh, |envelope| async move { Ok(refresh(&envelope)) });
    bus.on(&subjects.menu, |envelope| async move { Ok(menu(&envelope)) });
    bus.on(&subjects.graphql, |envelope| async move { Ok(crud(&envelope)) });
    bus.on(&subjects.sidebar_graphql, |envelope| async move { Ok(crud(&envelope)) });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format, cli.log_filter.as_deref());

    let config = cli.into_config()?;
    let bus = Arc::new(InMemoryBus::new());
    stub_backends(&bus, &config.subjects);

    let mut module = NetworkModule::new(&config, bus);
    let port = module.start().await?;
    info!(port, "edgeway dev server listening");

    module
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
        })
        .await
}
