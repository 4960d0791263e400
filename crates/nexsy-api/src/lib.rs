//! REST surface: account registration and login, the user roster, message
//! history and a health probe.

pub mod auth;
pub mod error;
pub mod health;
pub mod messages;
pub mod middleware;
pub mod users;

use std::sync::Arc;

use tracing::error;

use nexsy_db::Database;

pub use auth::Credentials;
pub use error::{ApiError, ApiResult};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub credentials: Credentials,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, credentials: Credentials) -> AppState {
        Arc::new(Self { db, credentials })
    }
}

/// Run a database call on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        anyhow::anyhow!("blocking task failed: {}", e)
    })?
}
