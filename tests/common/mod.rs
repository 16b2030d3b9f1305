#![allow(dead_code)]

use chrono::{Duration, Utc};
use sessionkeeper::application_impl::*;
use sessionkeeper::domain_model::*;
use sessionkeeper::domain_port::*;
use sessionkeeper::infra_storage::MemorySessionStore;
use std::sync::Arc;

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub persistence: Arc<MemorySessionStore>,
    pub tokens: Arc<FakeTokenRefreshClient>,
    pub navigator: Arc<RecordingNavigator>,
    pub manager: Arc<SessionLifecycleManager>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(LifecycleConfig::default(), |tokens| tokens)
    }

    pub fn with_tokens(
        configure: impl FnOnce(FakeTokenRefreshClient) -> FakeTokenRefreshClient,
    ) -> Self {
        Self::build(LifecycleConfig::default(), configure)
    }

    pub fn build(
        config: LifecycleConfig,
        configure: impl FnOnce(FakeTokenRefreshClient) -> FakeTokenRefreshClient,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let tokens = Arc::new(configure(FakeTokenRefreshClient::new(clock.clone())));
        let persistence = Arc::new(MemorySessionStore::new());
        let navigator = Arc::new(RecordingNavigator::new());
        let manager = SessionLifecycleManager::new(
            Arc::new(SessionStore::new()),
            persistence.clone(),
            tokens.clone(),
            navigator.clone(),
            clock.clone(),
            config,
        );
        Self {
            clock,
            persistence,
            tokens,
            navigator,
            manager,
        }
    }

    /// Put a session in storage as if a previous run had logged in.
    pub async fn stored_session(&self, access_ttl: Duration, refresh_ttl: Duration) -> SessionRecord {
        let record = self.tokens.issue_session("ada", access_ttl, refresh_ttl);
        self.persistence.save_session(&record).await.unwrap();
        record
    }

    /// Stored session with an hour of access and ten days of refresh left, hydrated.
    pub async fn initialized_session(&self) -> SessionRecord {
        let record = self
            .stored_session(Duration::hours(1), Duration::days(10))
            .await;
        assert_eq!(self.manager.initialize().await, InitOutcome::Ready);
        record
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.manager.store().snapshot()
    }
}
