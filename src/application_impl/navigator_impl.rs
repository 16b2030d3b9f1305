use crate::domain_model::LoginRedirect;
use crate::domain_port::Navigator;
use crate::logger::*;
use std::sync::Mutex;

/// Host without a UI: forced sign-outs only show up in the log.
#[derive(Debug, Default)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate_to_login(&self, redirect: LoginRedirect) {
        warn!(
            expired = redirect.expired,
            reason = ?redirect.reason,
            "navigating to login"
        );
    }
}

/// Keeps every redirect it receives.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    redirects: Mutex<Vec<LoginRedirect>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn redirects(&self) -> Vec<LoginRedirect> {
        self.redirects
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate_to_login(&self, redirect: LoginRedirect) {
        if let Ok(mut redirects) = self.redirects.lock() {
            redirects.push(redirect);
        }
    }
}
