use axum::{Json, extract::State};
use chrono::Utc;
use tracing::warn;

use nexsy_types::api::HealthResponse;

use crate::{AppState, blocking};

pub const SERVICE_NAME: &str = "Nexsy Chat Backend";

/// Always 200; `database` says whether a trivial query went through.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db = state.db.clone();
    let database = match blocking(move || db.ping()).await {
        Ok(()) => "connected",
        Err(e) => {
            warn!("Health check could not reach the database: {:#}", e);
            "disconnected"
        }
    };

    Json(HealthResponse {
        status: "OK".into(),
        service: SERVICE_NAME.into(),
        database: database.into(),
        timestamp: Utc::now(),
    })
}
