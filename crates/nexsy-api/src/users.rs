use axum::{Json, extract::State};
use tracing::error;

use nexsy_types::models::UserSummary;

use crate::error::{ApiError, ApiResult};
use crate::{AppState, blocking};

pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<UserSummary>>> {
    let db = state.db.clone();
    let users = blocking(move || db.list_users()).await.map_err(|e| {
        error!("Failed to list users: {:#}", e);
        ApiError::internal("Failed to fetch users")
    })?;
    Ok(Json(users))
}
