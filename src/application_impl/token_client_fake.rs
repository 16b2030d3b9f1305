use crate::domain_model::*;
use crate::domain_port::*;
use chrono::Duration;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const ACCESS_PREFIX: &str = "fake-access-token:";
const REFRESH_PREFIX: &str = "fake-refresh-token:";

/// In-process token server.
///
/// Access tokens embed the refresh token they were minted from, so
/// `validate` can answer without shared state unless a rotation is forced
/// with [`FakeTokenRefreshClient::rotate_canonical`].
pub struct FakeTokenRefreshClient {
    clock: Arc<dyn Clock>,
    access_ttl: Mutex<Duration>,
    latency: Mutex<Option<std::time::Duration>>,
    refresh_failures: Mutex<VecDeque<TokenClientError>>,
    validate_failures: Mutex<VecDeque<TokenClientError>>,
    canonical_override: Mutex<Option<String>>,
    serial: AtomicUsize,
    refresh_calls: AtomicUsize,
    validate_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeTokenRefreshClient {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            access_ttl: Mutex::new(Duration::hours(1)),
            latency: Mutex::new(None),
            refresh_failures: Mutex::new(VecDeque::new()),
            validate_failures: Mutex::new(VecDeque::new()),
            canonical_override: Mutex::new(None),
            serial: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            validate_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_access_ttl(self, ttl: Duration) -> Self {
        if let Ok(mut access_ttl) = self.access_ttl.lock() {
            *access_ttl = ttl;
        }
        self
    }

    pub fn with_latency(self, latency: std::time::Duration) -> Self {
        if let Ok(mut slot) = self.latency.lock() {
            *slot = Some(latency);
        }
        self
    }

    /// Queue errors returned by the next `refresh` calls, in order.
    pub fn fail_next_refreshes(&self, errors: impl IntoIterator<Item = TokenClientError>) {
        if let Ok(mut queue) = self.refresh_failures.lock() {
            queue.extend(errors);
        }
    }

    pub fn fail_next_validations(&self, errors: impl IntoIterator<Item = TokenClientError>) {
        if let Ok(mut queue) = self.validate_failures.lock() {
            queue.extend(errors);
        }
    }

    /// Pretend another device logged in: `validate` now reports `token`.
    pub fn rotate_canonical(&self, token: impl Into<String>) {
        if let Ok(mut slot) = self.canonical_override.lock() {
            *slot = Some(token.into());
        }
    }

    /// A login result whose tokens this fake recognizes.
    pub fn issue_session(
        &self,
        username: &str,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> SessionRecord {
        let now = self.clock.now();
        let refresh = format!("{REFRESH_PREFIX}{username}");
        SessionRecord {
            account: Account {
                user_id: get_fake_id(username),
                username: username.to_string(),
            },
            access_token: AccessToken::new(self.mint_access(&refresh), now + access_ttl),
            refresh_token: RefreshToken::new(refresh, now + refresh_ttl),
        }
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn validate_calls(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    /// Highest number of `refresh` calls observed running at once.
    pub fn peak_concurrent_refreshes(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn mint_access(&self, refresh_token: &str) -> String {
        let serial = self.serial.fetch_add(1, Ordering::SeqCst);
        format!("{ACCESS_PREFIX}{serial}:{refresh_token}")
    }

    async fn simulate_latency(&self) {
        let latency = self.latency.lock().ok().and_then(|l| *l);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn next_failure(queue: &Mutex<VecDeque<TokenClientError>>) -> Option<TokenClientError> {
        queue.lock().ok().and_then(|mut q| q.pop_front())
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl TokenRefreshClient for FakeTokenRefreshClient {
    async fn refresh(&self, refresh_token: &str) -> Result<IssuedAccess, TokenClientError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        self.simulate_latency().await;

        if let Some(err) = Self::next_failure(&self.refresh_failures) {
            return Err(err);
        }
        if !refresh_token.starts_with(REFRESH_PREFIX) {
            return Err(TokenClientError::Unauthorized);
        }

        let ttl = self
            .access_ttl
            .lock()
            .map(|ttl| *ttl)
            .unwrap_or_else(|_| Duration::hours(1));
        Ok(IssuedAccess {
            access_token: self.mint_access(refresh_token),
            expires_at: self.clock.now() + ttl,
        })
    }

    async fn validate(&self, access_token: &str) -> Result<String, TokenClientError> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if let Some(err) = Self::next_failure(&self.validate_failures) {
            return Err(err);
        }
        if let Some(canonical) = self.canonical_override.lock().ok().and_then(|c| c.clone()) {
            return Ok(canonical);
        }

        access_token
            .strip_prefix(ACCESS_PREFIX)
            .and_then(|rest| rest.split_once(':'))
            .map(|(_, refresh)| refresh.to_string())
            .ok_or_else(|| TokenClientError::NetworkTransient("unrecognized access token".into()))
    }
}

fn get_fake_id(username: &str) -> UserId {
    UserId(uuid::Uuid::new_v5(
        &uuid::Uuid::NAMESPACE_OID,
        username.as_bytes(),
    ))
}
