use crate::domain_model::AppState;
use crate::domain_port::AppLifecycleSignal;
use tokio::sync::watch;

/// Lifecycle signal fed by the host, one call per platform transition.
pub struct ChannelLifecycleSignal {
    state: watch::Sender<AppState>,
}

impl ChannelLifecycleSignal {
    pub fn new(initial: AppState) -> Self {
        let (state, _) = watch::channel(initial);
        Self { state }
    }

    pub fn set(&self, state: AppState) {
        self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    pub fn current(&self) -> AppState {
        *self.state.borrow()
    }
}

impl AppLifecycleSignal for ChannelLifecycleSignal {
    fn subscribe(&self) -> watch::Receiver<AppState> {
        self.state.subscribe()
    }
}
