use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Verification transport error: {0}")]
    Transport(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Purchase request failed: {0}")]
    Purchase(String),
    #[error("Order {order_id} is paid but no tariff could be resolved")]
    TariffUnresolved { order_id: String },
    #[error("Subscription activation failed for order {order_id}: {message}")]
    Activation { order_id: String, message: String },
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ReconcileError {
    /// Money has moved but the subscription could not be activated.
    ///
    /// These are surfaced separately from a declined payment: the remedy is a full
    /// reload that re-derives state from the authoritative store.
    pub fn is_resolution_fatal(&self) -> bool {
        matches!(
            self,
            ReconcileError::TariffUnresolved { .. } | ReconcileError::Activation { .. }
        )
    }

    /// Errors that only mean "we don't know yet" and are retried by the poller.
    pub fn is_inconclusive(&self) -> bool {
        matches!(
            self,
            ReconcileError::Transport(_) | ReconcileError::Http(_) | ReconcileError::Json(_)
        )
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for ReconcileError {
    fn from(e: rocksdb::Error) -> Self {
        ReconcileError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
