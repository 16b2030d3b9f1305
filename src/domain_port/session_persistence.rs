use crate::domain_model::*;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("no session stored")]
    NotFound,
    #[error("session read failed: {0}")]
    Read(String),
    #[error("session write failed: {0}")]
    Write(String),
}

/// Encrypted storage for the single session record of this app instance.
#[async_trait::async_trait]
pub trait SessionPersistence: Send + Sync {
    async fn load_session(&self) -> Result<SessionRecord, PersistenceError>;
    async fn save_session(&self, record: &SessionRecord) -> Result<(), PersistenceError>;
    /// Removing an absent record is not an error.
    async fn delete_session(&self) -> Result<(), PersistenceError>;
}
