use std::sync::Arc;

use anyhow::{Result, anyhow};

use nexsy_db::MessageStore;

/// Shared store handle that runs every call on the blocking pool, so a slow
/// SQLite write suspends only the event that issued it.
#[derive(Clone)]
pub struct StoreHandle(Arc<dyn MessageStore>);

impl StoreHandle {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self(store)
    }

    pub async fn call<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn MessageStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.0.clone();
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| anyhow!("spawn_blocking join error: {}", e))?
    }
}
