use crate::domain_model::*;
use tokio::sync::watch;

/// Observable container for the current session.
///
/// Every setter is a single write to a [`watch`] channel, so subscribers and
/// [`SessionStore::snapshot`] readers always see a whole session, never a
/// half-applied one.
pub struct SessionStore {
    state: watch::Sender<SessionSnapshot>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self { state }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn read<R>(&self, f: impl FnOnce(&SessionSnapshot) -> R) -> R {
        f(&self.state.borrow())
    }

    pub fn generation(&self) -> u64 {
        self.state.borrow().generation
    }

    pub fn set_user(&self, account: Account) {
        self.state.send_modify(|s| s.account = Some(account));
    }

    pub fn set_access_token(&self, token: AccessToken) {
        self.state.send_modify(|s| s.access_token = Some(token));
    }

    pub fn set_refresh_token(&self, token: RefreshToken) {
        self.state.send_modify(|s| s.refresh_token = Some(token));
    }

    pub fn set_access_expired(&self, expired: bool) {
        self.state.send_if_modified(|s| {
            let changed = s.flags.access_expired != expired;
            s.flags.access_expired = expired;
            changed
        });
    }

    pub fn set_refresh_expired(&self, expired: bool) {
        self.state.send_if_modified(|s| {
            let changed = s.flags.refresh_expired != expired;
            s.flags.refresh_expired = expired;
            changed
        });
    }

    /// Install a session hydrated from storage. `access_token` is `None` when
    /// the stored one is too close to expiry to hand out. Nothing is written
    /// if the store moved past `expected_generation` meanwhile (a login won).
    pub fn hydrate(
        &self,
        expected_generation: u64,
        account: Account,
        refresh_token: RefreshToken,
        access_token: Option<AccessToken>,
    ) -> Option<u64> {
        let mut installed = None;
        self.state.send_if_modified(|s| {
            if s.generation != expected_generation {
                return false;
            }
            installed = Some(Self::install_into(s, account, refresh_token, access_token));
            true
        });
        installed
    }

    /// Replace whatever is held with a freshly exchanged session.
    pub fn replace(&self, record: SessionRecord) -> u64 {
        let mut generation = 0;
        self.state.send_modify(|s| {
            generation = Self::install_into(
                s,
                record.account,
                record.refresh_token,
                Some(record.access_token),
            );
        });
        generation
    }

    fn install_into(
        s: &mut SessionSnapshot,
        account: Account,
        refresh_token: RefreshToken,
        access_token: Option<AccessToken>,
    ) -> u64 {
        *s = SessionSnapshot {
            flags: ExpiryFlags {
                access_expired: access_token.is_none(),
                refresh_expired: false,
            },
            account: Some(account),
            access_token,
            refresh_token: Some(refresh_token),
            last_sign_out: None,
            generation: s.generation + 1,
        };
        s.generation
    }

    /// Store a renewed access token, unless the session it was minted for is gone.
    pub fn apply_refreshed_access(&self, generation: u64, token: AccessToken) -> bool {
        self.state.send_if_modified(|s| {
            if s.generation != generation || s.refresh_token.is_none() {
                return false;
            }
            s.access_token = Some(token);
            s.flags.access_expired = false;
            true
        })
    }

    /// Drop the session in one write. Both flags end up set, so no reader can
    /// pair a live access token with an expired refresh flag. Returns the
    /// generation of the cleared state.
    pub fn clear(&self, reason: SignOutReason) -> u64 {
        let mut cleared = 0;
        self.state.send_modify(|s| cleared = Self::tombstone(s, reason));
        cleared
    }

    /// Like [`SessionStore::clear`], but only if the session is still the one
    /// identified by `generation` and has not been cleared already.
    pub fn clear_if(&self, generation: u64, reason: SignOutReason) -> Option<u64> {
        let mut cleared = None;
        self.state.send_if_modified(|s| {
            if s.generation != generation || s.refresh_token.is_none() {
                return false;
            }
            cleared = Some(Self::tombstone(s, reason));
            true
        });
        cleared
    }

    /// Clear unless the store moved past `generation`, whether or not a
    /// session is held yet.
    pub fn clear_at(&self, generation: u64, reason: SignOutReason) -> Option<u64> {
        let mut cleared = None;
        self.state.send_if_modified(|s| {
            if s.generation != generation {
                return false;
            }
            cleared = Some(Self::tombstone(s, reason));
            true
        });
        cleared
    }

    /// Record that there is no usable session, unless one was installed
    /// after `generation`.
    pub fn mark_signed_out_if(&self, generation: u64) -> bool {
        self.state.send_if_modified(|s| {
            if s.generation != generation || s.flags.refresh_expired {
                return false;
            }
            s.flags.refresh_expired = true;
            true
        })
    }

    fn tombstone(s: &mut SessionSnapshot, reason: SignOutReason) -> u64 {
        *s = SessionSnapshot {
            account: None,
            access_token: None,
            refresh_token: None,
            flags: ExpiryFlags {
                access_expired: true,
                refresh_expired: true,
            },
            last_sign_out: Some(reason),
            generation: s.generation + 1,
        };
        s.generation
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
