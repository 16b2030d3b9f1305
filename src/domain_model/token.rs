use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Short-lived credential attached to every authenticated call.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Longer-lived credential used only to mint new access tokens.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// True when less than `margin` is left before expiry, including when already expired.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        expires_within(self.expires_at, now, margin)
    }
}

impl RefreshToken {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        expires_within(self.expires_at, now, margin)
    }
}

fn expires_within(expires_at: DateTime<Utc>, now: DateTime<Utc>, margin: Duration) -> bool {
    expires_at - now < margin
}

// Token values never reach the logs.
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
