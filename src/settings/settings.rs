use crate::application_impl::LifecycleConfig;
use anyhow::{Result, anyhow};
use config::{Config, File, FileFormat};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub auth: Auth,
    pub log: Log,
    #[serde(default)]
    pub session: Session,
    pub storage: Storage,
}

#[derive(Debug, Deserialize)]
pub struct Auth {
    pub backend: String, // "fake" or "http"
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[derive(Debug, Deserialize)]
pub struct Session {
    #[serde(default = "default_margin_secs")]
    pub margin_secs: i64,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_rotation_check_every")]
    pub rotation_check_every: u32,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
    pub backend: String, // "file" or "memory"
    #[serde(default = "default_storage_dir")]
    pub dir: String,
    #[serde(default = "default_key_env")]
    pub key_env: String,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            margin_secs: default_margin_secs(),
            tick_interval_ms: default_tick_interval_ms(),
            rotation_check_every: default_rotation_check_every(),
        }
    }
}

impl Session {
    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            margin: chrono::Duration::seconds(self.margin_secs),
            tick_interval: Duration::from_millis(self.tick_interval_ms.max(1)),
            rotation_check_every: self.rotation_check_every.max(1),
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_margin_secs() -> i64 {
    5 * 60
}

fn default_tick_interval_ms() -> u64 {
    4_000
}

fn default_rotation_check_every() -> u32 {
    1
}

fn default_storage_dir() -> String {
    "data".to_string()
}

fn default_key_env() -> String {
    "SESSION_STORE_KEY".to_string()
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);
    build(Config::builder().add_source(File::with_name(path)))
}

pub fn parse_settings_toml(toml: &str) -> Result<Settings> {
    build(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
}

fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Settings> {
    let settings: Settings = builder
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}
