use crate::domain_model::AppState;
use tokio::sync::watch;

/// Source of foreground/background transitions.
pub trait AppLifecycleSignal: Send + Sync {
    fn subscribe(&self) -> watch::Receiver<AppState>;
}
