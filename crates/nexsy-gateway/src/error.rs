/// Why an inbound event was rejected. Each variant is reported back to the
/// initiating connection as an `error` event; none of them ends the connection.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// A required field was missing or empty. Raised before any side effect.
    #[error("invalid event: {0}")]
    Validation(&'static str),

    #[error("not found: {0}")]
    NotFound(&'static str),

    /// The store failed. `action` is what the client asked for, phrased for
    /// the client ("send message"); the source stays server-side.
    #[error("failed to {action}: {source}")]
    Persistence {
        action: &'static str,
        source: anyhow::Error,
    },
}

impl DeliveryError {
    /// Adapter for `map_err` on store calls.
    pub fn persistence(action: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::Persistence { action, source }
    }

    /// Short text for the client's `error` event.
    pub fn client_message(&self) -> String {
        match self {
            Self::Validation(msg) | Self::NotFound(msg) => (*msg).to_string(),
            Self::Persistence { action, .. } => format!("Failed to {}", action),
        }
    }
}
