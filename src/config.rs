// Configuration: built-in defaults, then an optional JSON file, then
// environment variables. There are no command-line flags.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG: &str = "ADMIN_CONSOLE_CONFIG";
pub const ENV_API_URL: &str = "ADMIN_CONSOLE_API_URL";
pub const ENV_LOG_DIR: &str = "ADMIN_CONSOLE_LOG_DIR";
pub const ENV_LOG_LEVEL: &str = "ADMIN_CONSOLE_LOG_LEVEL";
pub const ENV_ADMIN_USER: &str = "ADMIN_CONSOLE_ADMIN_USER";

/// Runtime settings. Every field has a default so a config file only needs
/// the keys it wants to change.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ConsoleConfig {
    /// Base URL of the backend REST API.
    pub api_url: String,
    pub log_dir: PathBuf,
    /// env_logger filter directives for the file, e.g. `info` or
    /// `warn,admin_console::api=debug`.
    pub log_level: String,
    pub colored_output: bool,
    /// The administrative account. It is the initial chat target and
    /// payloads sent to it get a leading `/`.
    pub admin_user: String,
    pub login_delay_ms: u64,
    pub reply_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub inbox_capacity: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        ConsoleConfig {
            api_url: "https://api.resonite.com".into(),
            log_dir: PathBuf::from("ConsoleLogs"),
            log_level: "info".into(),
            colored_output: true,
            admin_user: "U-Resonite".into(),
            login_delay_ms: 1000,
            reply_timeout_ms: 5000,
            poll_interval_ms: 250,
            inbox_capacity: 256,
        }
    }
}

impl ConsoleConfig {
    /// Load the config the program runs with.
    ///
    /// The file is `$ADMIN_CONSOLE_CONFIG` when set (and must exist), else
    /// `<config dir>/admin-console/config.json` when present.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os(ENV_CONFIG) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Parsing config file {}", path.display()))
    }

    /// Override fields from environment-style lookups.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL) {
            self.api_url = url;
        }
        if let Some(dir) = lookup(ENV_LOG_DIR) {
            self.log_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(user) = lookup(ENV_ADMIN_USER) {
            self.admin_user = user;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.admin_user.trim().is_empty() {
            anyhow::bail!("adminUser must not be empty");
        }
        if self.inbox_capacity == 0 {
            anyhow::bail!("inboxCapacity must be at least 1");
        }
        if self.poll_interval_ms == 0 {
            anyhow::bail!("pollIntervalMs must be at least 1");
        }
        if self.reply_timeout_ms == 0 {
            anyhow::bail!("replyTimeoutMs must be at least 1");
        }
        Ok(())
    }

    pub fn login_delay(&self) -> Duration {
        Duration::from_millis(self.login_delay_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("admin-console").join("config.json"))
}
