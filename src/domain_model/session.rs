use crate::domain_model::*;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The aggregate persisted at login and after every successful refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub account: Account,
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
}

/// On-disk layout of a [`SessionRecord`]. Timestamps are absolute so a record
/// stays meaningful across any amount of downtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub account: Account,
    pub access_token: String,
    pub expires_access: DateTime<Utc>,
    pub refresh_token: String,
    pub expires_refresh: DateTime<Utc>,
}

impl From<&SessionRecord> for PersistedSession {
    fn from(record: &SessionRecord) -> Self {
        Self {
            account: record.account.clone(),
            access_token: record.access_token.token.clone(),
            expires_access: record.access_token.expires_at,
            refresh_token: record.refresh_token.token.clone(),
            expires_refresh: record.refresh_token.expires_at,
        }
    }
}

impl From<PersistedSession> for SessionRecord {
    fn from(persisted: PersistedSession) -> Self {
        Self {
            account: persisted.account,
            access_token: AccessToken::new(persisted.access_token, persisted.expires_access),
            refresh_token: RefreshToken::new(persisted.refresh_token, persisted.expires_refresh),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiryFlags {
    pub access_expired: bool,
    pub refresh_expired: bool,
}

/// Why a session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutReason {
    /// The refresh token reached the safety margin.
    Expired,
    /// The server rejected the refresh token outright.
    Unauthorized,
    /// The server holds a different refresh token: someone logged in elsewhere.
    ConcurrentSession,
    /// The user asked to sign out.
    Logout,
}

impl SignOutReason {
    pub fn is_expiry(self) -> bool {
        matches!(self, SignOutReason::Expired | SignOutReason::Unauthorized)
    }
}

/// Navigation request emitted on forced sign-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginRedirect {
    pub expired: bool,
    pub reason: SignOutReason,
}

impl From<SignOutReason> for LoginRedirect {
    fn from(reason: SignOutReason) -> Self {
        Self {
            expired: reason.is_expiry(),
            reason,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Active,
    Inactive,
    Background,
}

impl AppState {
    pub fn is_foreground(self) -> bool {
        self == AppState::Active
    }
}

impl std::str::FromStr for AppState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AppState::Active),
            "inactive" => Ok(AppState::Inactive),
            "background" => Ok(AppState::Background),
            other => Err(format!("unknown app state: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    HydratedValid,
    HydratedNearAccessExpiry,
    Refreshing,
    ExpiredRefresh,
    SignedOut,
}

/// One consistent view of the session store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub account: Option<Account>,
    pub access_token: Option<AccessToken>,
    pub refresh_token: Option<RefreshToken>,
    pub flags: ExpiryFlags,
    pub last_sign_out: Option<SignOutReason>,
    /// Bumped whenever the session identity changes (hydration, login, clear).
    pub generation: u64,
}

impl SessionSnapshot {
    pub fn to_record(&self) -> Option<SessionRecord> {
        Some(SessionRecord {
            account: self.account.clone()?,
            access_token: self.access_token.clone()?,
            refresh_token: self.refresh_token.clone()?,
        })
    }

    /// Access needs renewal when it is close to expiry, or missing while a
    /// refresh token is still held.
    pub fn access_needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        match (&self.access_token, &self.refresh_token) {
            (Some(access), _) => access.expires_within(now, margin),
            (None, Some(_)) => true,
            (None, None) => false,
        }
    }

    pub fn phase(&self, now: DateTime<Utc>, margin: Duration) -> SessionPhase {
        if self.refresh_token.is_none() {
            return match self.last_sign_out {
                Some(reason) if reason.is_expiry() => SessionPhase::ExpiredRefresh,
                _ => SessionPhase::SignedOut,
            };
        }
        if self.access_needs_refresh(now, margin) {
            SessionPhase::HydratedNearAccessExpiry
        } else {
            SessionPhase::HydratedValid
        }
    }
}
