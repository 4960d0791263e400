use axum::{Extension, Json, extract::State};
use tracing::error;

use nexsy_types::api::{Claims, MessagesResponse};

use crate::error::{ApiError, ApiResult};
use crate::{AppState, blocking};

/// History for the caller: every live message they sent or received, oldest
/// first. Deleted messages are left out.
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<MessagesResponse>> {
    let db = state.db.clone();
    let username = claims.sub.clone();
    let messages = blocking(move || db.messages_for(&username))
        .await
        .map_err(|e| {
            error!("Failed to load messages for {}: {:#}", claims.sub, e);
            ApiError::internal("Failed to fetch messages")
        })?;

    Ok(Json(MessagesResponse {
        success: true,
        messages,
    }))
}
