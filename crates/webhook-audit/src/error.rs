use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit store unavailable: {0}")]
    Store(String),
    #[error("Delivery event {0} not found")]
    NotFound(String),
    #[error("Delivery event {0} already recorded")]
    Duplicate(String),
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("Invalid page size: {0}")]
    InvalidLimit(usize),
}

impl AuditError {
    /// Whether the failure came from the backing store rather than the caller.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}
