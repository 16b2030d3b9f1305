use crate::application_impl::SessionStore;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MARGIN_SECS: i64 = 5 * 60;
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(4);

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Act this long before a token's declared expiry.
    pub margin: chrono::Duration,
    pub tick_interval: Duration,
    /// Ask the server for the canonical refresh token every n-th tick.
    pub rotation_check_every: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            margin: chrono::Duration::seconds(DEFAULT_MARGIN_SECS),
            tick_interval: DEFAULT_TICK_INTERVAL,
            rotation_check_every: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// Nothing stored, or storage unreadable.
    NoSession,
    /// The stored refresh token was inside the margin; session dropped.
    Expired,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    /// Another refresh holds the guard.
    InFlight,
    NoSession,
    /// The session ended while the call was outstanding; result dropped.
    Stale,
    /// The server rejected the refresh token; session ended.
    Rejected,
    /// Transient failure; state untouched.
    Failed,
}

struct Ticker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct RefreshGuard<'a>(&'a AtomicBool);

impl<'a> RefreshGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Keeps the session alive while the app is in the foreground.
///
/// Owns the periodic health-check: on every tick it renews the access token
/// when it nears expiry, signs out once the refresh token nears expiry, and
/// signs out when the server reports that the refresh token was rotated by
/// another login. Writes that complete after the session they were started
/// for has ended are discarded via the store's generation.
pub struct SessionLifecycleManager {
    me: Weak<SessionLifecycleManager>,
    store: Arc<SessionStore>,
    persistence: Arc<dyn SessionPersistence>,
    token_client: Arc<dyn TokenRefreshClient>,
    navigator: Arc<dyn Navigator>,
    clock: Arc<dyn Clock>,
    config: LifecycleConfig,
    initialized: AtomicBool,
    foreground: AtomicBool,
    refreshing: AtomicBool,
    ticks: AtomicU64,
    tick_lock: tokio::sync::Mutex<()>,
    persist_lock: tokio::sync::Mutex<()>,
    ticker: Mutex<Option<Ticker>>,
}

impl SessionLifecycleManager {
    pub fn new(
        store: Arc<SessionStore>,
        persistence: Arc<dyn SessionPersistence>,
        token_client: Arc<dyn TokenRefreshClient>,
        navigator: Arc<dyn Navigator>,
        clock: Arc<dyn Clock>,
        config: LifecycleConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            store,
            persistence,
            token_client,
            navigator,
            clock,
            config,
            initialized: AtomicBool::new(false),
            foreground: AtomicBool::new(false),
            refreshing: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            tick_lock: tokio::sync::Mutex::new(()),
            persist_lock: tokio::sync::Mutex::new(()),
            ticker: Mutex::new(None),
        })
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        if !self.initialized.load(Ordering::Acquire) {
            return SessionPhase::Uninitialized;
        }
        if self.refreshing.load(Ordering::Acquire) {
            return SessionPhase::Refreshing;
        }
        let now = self.clock.now();
        self.store.read(|s| s.phase(now, self.config.margin))
    }

    /// Hydrate the store from persistence. Runs once; the health-check is
    /// only armed after it returns.
    pub async fn initialize(&self) -> InitOutcome {
        if self.initialized.load(Ordering::Acquire) {
            debug!("session already initialized");
            return InitOutcome::Ready;
        }
        let outcome = self.hydrate_from_storage().await;
        info!(?outcome, "session initialized");
        self.initialized.store(true, Ordering::Release);
        if self.foreground.load(Ordering::Acquire) {
            self.arm();
        }
        outcome
    }

    async fn hydrate_from_storage(&self) -> InitOutcome {
        let generation = self.store.generation();
        let record = match self.persistence.load_session().await {
            Ok(record) => record,
            Err(PersistenceError::NotFound) => {
                debug!("no stored session");
                self.mark_signed_out(generation);
                return InitOutcome::NoSession;
            }
            Err(e) => {
                warn!(error = %e, "stored session unreadable, starting signed out");
                self.mark_signed_out(generation);
                return InitOutcome::NoSession;
            }
        };

        let now = self.clock.now();
        let margin = self.config.margin;
        if record.refresh_token.expires_within(now, margin) {
            info!(
                expires_at = %record.refresh_token.expires_at,
                "stored refresh token expires within margin, dropping session"
            );
            match self.store.clear_at(generation, SignOutReason::Expired) {
                Some(cleared) => self.delete_persisted(cleared).await,
                None => debug!("session replaced while loading, keeping the newer one"),
            }
            return InitOutcome::Expired;
        }

        let access_due = record.access_token.expires_within(now, margin);
        let access_token = if access_due {
            None
        } else {
            Some(record.access_token)
        };
        if self
            .store
            .hydrate(generation, record.account, record.refresh_token, access_token)
            .is_none()
        {
            debug!("session replaced while loading, keeping the newer one");
            return InitOutcome::Ready;
        }

        if access_due {
            debug!("stored access token expires within margin, refreshing");
            self.refresh().await;
        }
        InitOutcome::Ready
    }

    fn mark_signed_out(&self, generation: u64) {
        if !self.store.mark_signed_out_if(generation) {
            debug!("store moved on while loading, leaving it as is");
        }
    }

    /// Follow `app_state` until `cancel` fires, then disarm.
    pub async fn run(
        self: Arc<Self>,
        mut app_state: watch::Receiver<AppState>,
        cancel: CancellationToken,
    ) {
        let initial = *app_state.borrow_and_update();
        self.foreground
            .store(initial.is_foreground(), Ordering::Release);
        self.initialize().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = app_state.changed() => {
                    if changed.is_err() {
                        info!("app lifecycle signal closed");
                        break;
                    }
                    let state = *app_state.borrow_and_update();
                    self.handle_app_state(state);
                }
            }
        }

        self.shutdown().await;
    }

    pub fn handle_app_state(&self, state: AppState) {
        debug!(?state, "app state changed");
        self.foreground
            .store(state.is_foreground(), Ordering::Release);
        if !state.is_foreground() {
            self.disarm();
        } else if self.initialized.load(Ordering::Acquire) {
            self.arm();
        } else {
            debug!("initialization pending, health-check not armed yet");
        }
    }

    /// Start the periodic health-check. Returns false if one is already armed.
    pub fn arm(&self) -> bool {
        let Some(manager) = self.me.upgrade() else {
            return false;
        };
        let Ok(mut slot) = self.ticker.lock() else {
            return false;
        };
        if let Some(ticker) = slot.as_ref() {
            if !ticker.handle.is_finished() {
                return false;
            }
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { manager.tick_loop(token).await });
        *slot = Some(Ticker { cancel, handle });
        info!(interval = ?self.config.tick_interval, "session health-check armed");
        true
    }

    /// Stop the periodic health-check. A tick already running finishes.
    pub fn disarm(&self) -> bool {
        let ticker = match self.ticker.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        match ticker {
            Some(ticker) => {
                ticker.cancel.cancel();
                info!("session health-check disarmed");
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.ticker
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|t| !t.handle.is_finished()))
            .unwrap_or(false)
    }

    /// Disarm and wait for any in-flight tick to finish.
    pub async fn shutdown(&self) {
        let ticker = match self.ticker.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(ticker) = ticker {
            ticker.cancel.cancel();
            let r = ticker.handle.await;
            debug!("health-check task finished: {:?}", r);
        }
    }

    async fn tick_loop(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => self.tick().await,
            }
        }
    }

    /// One health-check pass.
    pub async fn tick(&self) {
        let Ok(_running) = self.tick_lock.try_lock() else {
            debug!("previous health-check still running, skipping tick");
            return;
        };
        let margin = self.config.margin;

        let snapshot = self.store.snapshot();
        if snapshot.refresh_token.is_none() {
            trace!("no session, nothing to check");
            return;
        }
        if snapshot.access_needs_refresh(self.clock.now(), margin) {
            self.store.set_access_expired(true);
            self.refresh().await;
        }

        let snapshot = self.store.snapshot();
        if let Some(refresh) = &snapshot.refresh_token {
            if refresh.expires_within(self.clock.now(), margin) {
                info!(expires_at = %refresh.expires_at, "refresh token expires within margin");
                self.end_session(snapshot.generation, SignOutReason::Expired)
                    .await;
            }
        }

        let tick = self.ticks.fetch_add(1, Ordering::AcqRel) + 1;
        let every = u64::from(self.config.rotation_check_every.max(1));
        if tick % every == 0 {
            self.check_rotation().await;
        }
    }

    async fn check_rotation(&self) {
        let snapshot = self.store.snapshot();
        let (Some(access), Some(refresh)) = (&snapshot.access_token, &snapshot.refresh_token)
        else {
            return;
        };

        match self.token_client.validate(&access.token).await {
            Ok(canonical) if canonical == refresh.token => trace!("refresh token still canonical"),
            Ok(_) => {
                warn!("refresh token rotated by another login");
                self.end_session(snapshot.generation, SignOutReason::ConcurrentSession)
                    .await;
            }
            Err(e) => warn!(error = %e, "session validation failed, retrying next tick"),
        }
    }

    /// Renew the access token. At most one call is outstanding at a time;
    /// concurrent callers get [`RefreshOutcome::InFlight`] immediately.
    pub async fn refresh(&self) -> RefreshOutcome {
        let Some(_guard) = RefreshGuard::acquire(&self.refreshing) else {
            debug!("refresh already in flight");
            return RefreshOutcome::InFlight;
        };

        let snapshot = self.store.snapshot();
        let Some(refresh_token) = snapshot.refresh_token else {
            return RefreshOutcome::NoSession;
        };
        let generation = snapshot.generation;

        match self.token_client.refresh(&refresh_token.token).await {
            Ok(issued) => {
                let access = AccessToken::new(issued.access_token, issued.expires_at);
                if !self.store.apply_refreshed_access(generation, access) {
                    info!("session ended during refresh, dropping new access token");
                    return RefreshOutcome::Stale;
                }
                debug!(expires_at = %issued.expires_at, "access token refreshed");
                if let Err(e) = self.persist_current(generation).await {
                    warn!(error = %e, "refreshed session not persisted");
                }
                RefreshOutcome::Refreshed
            }
            Err(TokenClientError::Unauthorized) => {
                warn!("refresh token rejected by server");
                self.end_session(generation, SignOutReason::Unauthorized)
                    .await;
                RefreshOutcome::Rejected
            }
            Err(e) => {
                warn!(error = %e, "access token refresh failed, retrying next tick");
                RefreshOutcome::Failed
            }
        }
    }

    async fn end_session(&self, generation: u64, reason: SignOutReason) {
        let Some(cleared) = self.store.clear_if(generation, reason) else {
            debug!(?reason, "session already ended");
            return;
        };
        info!(?reason, "session ended");
        self.delete_persisted(cleared).await;
        self.navigator.navigate_to_login(LoginRedirect::from(reason));
    }

    /// Write the held session to storage if it is still `generation`.
    async fn persist_current(&self, generation: u64) -> Result<(), PersistenceError> {
        let _persisting = self.persist_lock.lock().await;
        let Some(record) = self
            .store
            .read(|s| (s.generation == generation).then(|| s.to_record()).flatten())
        else {
            debug!("session changed before it was persisted, skipping write");
            return Ok(());
        };
        self.persistence.save_session(&record).await
    }

    /// Remove the stored session, unless a login replaced the cleared
    /// state `generation` before the lock was taken.
    async fn delete_persisted(&self, generation: u64) {
        let _persisting = self.persist_lock.lock().await;
        if self.store.generation() != generation {
            debug!("session replaced before it was deleted, keeping the stored one");
            return;
        }
        if let Err(e) = self.persistence.delete_session().await {
            warn!(error = %e, "stored session not deleted");
        }
    }
}

#[async_trait::async_trait]
impl SessionService for SessionLifecycleManager {
    fn current_access_token(&self) -> Option<String> {
        self.store
            .read(|s| s.access_token.as_ref().map(|t| t.token.clone()))
    }

    fn is_access_expired(&self) -> bool {
        self.store.read(|s| s.flags.access_expired)
    }

    fn is_refresh_expired(&self) -> bool {
        self.store.read(|s| s.flags.refresh_expired)
    }

    async fn on_login(&self, record: SessionRecord) -> Result<(), SessionError> {
        if record
            .refresh_token
            .expires_within(self.clock.now(), self.config.margin)
        {
            return Err(SessionError::InvalidSession(
                "refresh token expires within the safety margin".to_string(),
            ));
        }

        let user_id = record.account.user_id;
        let generation = self.store.replace(record);
        info!(%user_id, "session installed");

        self.initialized.store(true, Ordering::Release);
        if self.foreground.load(Ordering::Acquire) {
            self.arm();
        }

        self.persist_current(generation).await?;
        Ok(())
    }

    async fn on_logout(&self) {
        let cleared = self.store.clear(SignOutReason::Logout);
        info!("signed out");
        self.delete_persisted(cleared).await;
    }
}
