use crate::domain_model::*;
use crate::domain_port::PersistenceError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("store error: {0}")]
    Store(#[from] PersistenceError),
    #[error("session is not usable: {0}")]
    InvalidSession(String),
}

/// What the rest of the app sees of the session.
#[async_trait::async_trait]
pub trait SessionService: Send + Sync {
    /// Bearer token for authenticated calls, if a session is live.
    fn current_access_token(&self) -> Option<String>;
    fn is_access_expired(&self) -> bool;
    fn is_refresh_expired(&self) -> bool;
    /// Install a freshly exchanged session. The in-memory session is replaced
    /// even when the write to storage fails; the error reports that write.
    async fn on_login(&self, record: SessionRecord) -> Result<(), SessionError>;
    /// Explicit sign-out. Navigation is left to the caller.
    async fn on_logout(&self);
}
