//! Router assembly for the `nexsy` binary. Kept in a library so integration
//! tests can serve the same app on an ephemeral port.

pub mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    http::HeaderValue,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use nexsy_api::middleware::require_auth;
use nexsy_api::{AppState, AppStateInner, Credentials, auth, health, messages, users};
use nexsy_db::Database;
use nexsy_gateway::{Hub, connection};

use crate::config::ServerConfig;

#[derive(Clone)]
struct SocketState {
    hub: Hub,
    heartbeat: Duration,
}

/// Wire the REST routes, the `/ws` socket endpoint and the shared layers
/// around one database.
pub fn build_app(config: &ServerConfig, db: Arc<Database>) -> Result<Router> {
    let app_state: AppState = AppStateInner::new(
        db.clone(),
        Credentials::new(&config.jwt_secret, config.token_ttl_days),
    );
    let socket_state = SocketState {
        hub: Hub::new(db),
        heartbeat: config.heartbeat,
    };

    let public_routes = Router::new()
        .route("/api/health", get(health::health))
        .route("/api/register", post(auth::register))
        .route("/api/login", post(auth::login))
        .route("/api/users", get(users::list_users))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/api/messages", get(messages::get_messages))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(socket_state);

    Ok(Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&config.cors_origins)?),
        ))
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    if origins.is_empty() {
        return Ok(CorsLayer::permissive());
    }
    let origins = origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>()
                .with_context(|| format!("invalid CORS origin {:?}", o))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(CorsLayer::permissive().allow_origin(AllowOrigin::list(origins)))
}

async fn ws_upgrade(State(state): State<SocketState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, state.hub, state.heartbeat))
}
