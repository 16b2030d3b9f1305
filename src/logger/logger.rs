use anyhow::{Result, anyhow};
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

const BOOTSTRAP_FILTER: &str = "info";

pub struct LogConfig {
    pub filter: String,
}

pub struct Logger {
    reload_handle: reload::Handle<EnvFilter, Registry>,
    env_override: bool,
}

impl Logger {
    /// Install the global subscriber. Logs go to stderr; stdout belongs to the
    /// host's command channel.
    pub fn new_bootstrap() -> Self {
        let env_filter = EnvFilter::try_from_default_env().ok();
        let env_override = env_filter.is_some();
        let filter = env_filter.unwrap_or_else(|| EnvFilter::new(BOOTSTRAP_FILTER));
        let (filter, reload_handle) = reload::Layer::new(filter);

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init();

        Self {
            reload_handle,
            env_override,
        }
    }

    /// Apply the configured filter unless `RUST_LOG` already chose one.
    pub fn reload_from_config(&self, config: &LogConfig) -> Result<()> {
        let filter = EnvFilter::try_new(&config.filter).map_err(|e| anyhow!(e))?;
        if self.env_override {
            tracing::debug!(configured = %config.filter, "RUST_LOG set, keeping it");
            return Ok(());
        }
        self.reload_handle.reload(filter).map_err(|e| anyhow!(e))?;
        Ok(())
    }
}
