use crate::application_port::SessionService;
use crate::domain_model::*;
use crate::runtime::App;
use anyhow::{Result, anyhow};
use chrono::Duration;
use std::str::FromStr;

/// One line of host input.
#[derive(Debug)]
pub enum HostCommand {
    AppState(AppState),
    /// `login {"account":…,"accessToken":…,…}` in the persisted layout.
    Login(SessionRecord),
    /// Mint a session from the fake backend.
    DemoLogin(String),
    Logout,
    Status,
    Quit,
}

impl FromStr for HostCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        match verb {
            "active" | "inactive" | "background" => {
                verb.parse().map(HostCommand::AppState).map_err(|e| anyhow!(e))
            }
            "login" => {
                let persisted: PersistedSession = serde_json::from_str(rest)?;
                Ok(HostCommand::Login(persisted.into()))
            }
            "demo-login" if !rest.is_empty() => Ok(HostCommand::DemoLogin(rest.to_string())),
            "demo-login" => Err(anyhow!("usage: demo-login <username>")),
            "logout" => Ok(HostCommand::Logout),
            "status" => Ok(HostCommand::Status),
            "quit" | "exit" => Ok(HostCommand::Quit),
            other => Err(anyhow!("unknown command: {other}")),
        }
    }
}

impl App {
    /// Apply a command; the returned text is meant for the host's stdout.
    pub async fn execute(&self, command: HostCommand) -> Result<String> {
        match command {
            HostCommand::AppState(state) => {
                self.lifecycle.set(state);
                Ok(format!("app state: {state:?}"))
            }
            HostCommand::Login(record) => {
                self.session.on_login(record).await?;
                Ok("logged in".to_string())
            }
            HostCommand::DemoLogin(username) => {
                let fake = self
                    .fake_tokens
                    .as_ref()
                    .ok_or_else(|| anyhow!("demo-login needs the fake auth backend"))?;
                let record = fake.issue_session(&username, Duration::hours(1), Duration::days(30));
                self.session.on_login(record).await?;
                Ok(format!("logged in as {username}"))
            }
            HostCommand::Logout => {
                self.session.on_logout().await;
                Ok("logged out".to_string())
            }
            HostCommand::Status => Ok(self.status()),
            HostCommand::Quit => Ok("bye".to_string()),
        }
    }

    pub fn status(&self) -> String {
        let snapshot = self.session.store().snapshot();
        format!(
            "phase={:?} user={} access_expired={} refresh_expired={} has_access_token={} armed={}",
            self.session.phase(),
            snapshot
                .account
                .as_ref()
                .map(|a| a.username.as_str())
                .unwrap_or("-"),
            snapshot.flags.access_expired,
            snapshot.flags.refresh_expired,
            self.session.current_access_token().is_some(),
            self.session.is_armed(),
        )
    }
}
