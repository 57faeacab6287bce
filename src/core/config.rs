use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    pub admin: AdminConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_users_file")]
    pub users_file: PathBuf,
    #[serde(default = "default_servers_file")]
    pub servers_file: PathBuf,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Refuse to start when a backing file exists but cannot be loaded
    #[serde(default = "default_abort_on_load_error")]
    pub abort_on_load_error: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Per-subscriber queue length before events are dropped
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_console")]
    pub console: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            users_file: default_users_file(),
            servers_file: default_servers_file(),
            write_timeout_ms: default_write_timeout_ms(),
            abort_on_load_error: default_abort_on_load_error(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            console: default_console(),
        }
    }
}

impl StorageConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl StreamConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

// Default value functions
fn default_port() -> u16 {
    8080
}

fn default_num_threads() -> usize {
    num_cpus::get()
}

fn default_users_file() -> PathBuf {
    PathBuf::from("data/users.json")
}

fn default_servers_file() -> PathBuf {
    PathBuf::from("data/servers.json")
}

fn default_write_timeout_ms() -> u64 {
    5_000
}

fn default_abort_on_load_error() -> bool {
    true
}

fn default_channel_capacity() -> usize {
    64
}

fn default_keep_alive_secs() -> u64 {
    15
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_console() -> bool {
    false
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .context("Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("Server port must be greater than 0");
        }

        if self.server.num_threads == 0 {
            bail!("num_threads must be greater than 0");
        }

        if self.storage.users_file.as_os_str().is_empty() {
            bail!("users_file must not be empty");
        }

        if self.storage.servers_file.as_os_str().is_empty() {
            bail!("servers_file must not be empty");
        }

        if self.storage.users_file == self.storage.servers_file {
            bail!(
                "users_file and servers_file must be different files (both are '{}')",
                self.storage.users_file.display()
            );
        }

        if self.storage.write_timeout_ms == 0 {
            bail!("write_timeout_ms must be greater than 0");
        }

        if self.stream.channel_capacity == 0 {
            bail!("channel_capacity must be greater than 0");
        }

        if self.stream.keep_alive_secs == 0 {
            bail!("keep_alive_secs must be greater than 0");
        }

        if self.admin.api_key.is_empty() {
            bail!("api_key must not be empty");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            );
        }

        let valid_formats = ["json", "console"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            bail!(
                "Invalid log format '{}'. Must be one of: json, console",
                self.logging.format
            );
        }

        Ok(())
    }
}
