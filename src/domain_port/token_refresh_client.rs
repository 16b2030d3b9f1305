use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum TokenClientError {
    #[error("refresh token rejected")]
    Unauthorized,
    #[error("network error: {0}")]
    NetworkTransient(String),
}

#[derive(Debug, Clone)]
pub struct IssuedAccess {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait TokenRefreshClient: Send + Sync {
    /// Mint a new access token from the refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<IssuedAccess, TokenClientError>;
    /// Return the refresh token the server currently considers canonical for
    /// the session owning `access_token`.
    async fn validate(&self, access_token: &str) -> Result<String, TokenClientError>;
}
