use crate::application_impl::*;
use crate::domain_model::AppState;
use crate::domain_port::*;
use crate::infra_http::*;
use crate::infra_storage::*;
use crate::logger::*;
use crate::settings::Settings;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const DEV_STORE_KEY: &str = "sessionkeeper-dev-store-key";

/// Everything the host needs, wired from settings.
pub struct App {
    pub session: Arc<SessionLifecycleManager>,
    pub lifecycle: Arc<ChannelLifecycleSignal>,
    /// Present with the `fake` auth backend, to mint demo sessions.
    pub fake_tokens: Option<Arc<FakeTokenRefreshClient>>,
    lifecycle_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl App {
    pub fn try_new(settings: &Settings, initial_state: AppState) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let persistence: Arc<dyn SessionPersistence> = match settings.storage.backend.as_str() {
            "file" => {
                let secret = std::env::var(&settings.storage.key_env).unwrap_or_else(|_| {
                    warn!(
                        key_env = %settings.storage.key_env,
                        "storage key not set, using the development key"
                    );
                    DEV_STORE_KEY.to_string()
                });
                Arc::new(EncryptedFileStore::new(&settings.storage.dir, &secret))
            }
            "memory" => Arc::new(MemorySessionStore::new()),
            other => return Err(anyhow::anyhow!("Unknown storage backend: {}", other)),
        };

        let mut fake_tokens = None;
        let token_client: Arc<dyn TokenRefreshClient> = match settings.auth.backend.as_str() {
            "fake" => {
                let fake = Arc::new(FakeTokenRefreshClient::new(clock.clone()));
                fake_tokens = Some(fake.clone());
                fake
            }
            "http" => {
                let base_url = settings.auth.base_url.clone().ok_or_else(|| {
                    anyhow::anyhow!("auth.base_url is required for the http backend")
                })?;
                Arc::new(HttpTokenRefreshClient::new(HttpTokenClientConfig {
                    base_url,
                    timeout: Duration::from_secs(settings.auth.timeout_secs),
                })?)
            }
            other => return Err(anyhow::anyhow!("Unknown auth backend: {}", other)),
        };

        let session = SessionLifecycleManager::new(
            Arc::new(SessionStore::new()),
            persistence,
            token_client,
            Arc::new(LogNavigator),
            clock,
            settings.session.lifecycle_config(),
        );

        let lifecycle = Arc::new(ChannelLifecycleSignal::new(initial_state));
        let cancel = CancellationToken::new();
        let lifecycle_handle = tokio::spawn(
            session
                .clone()
                .run(lifecycle.subscribe(), cancel.clone()),
        );

        info!("session keeper started");

        Ok(Self {
            session,
            lifecycle,
            fake_tokens,
            lifecycle_handle: Mutex::new(Some(lifecycle_handle)),
            cancel,
        })
    }

    pub async fn shutdown(&self) {
        info!("session keeper shutting down...");

        self.cancel.cancel();

        let handle = match self.lifecycle_handle.lock() {
            Ok(mut lock) => lock.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            let r = handle.await;
            info!("lifecycle handle dropped: {:?}", r);
        }
    }
}
