use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub worker: WorkerConfig,
    pub wizard: WizardConfig,
    pub paths: PathsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection settings for the local ingest worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Base URL of the worker's loopback HTTP API
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Timing and defaults for the ingest wizard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WizardConfig {
    /// Lock window after a step-changing navigation
    #[serde(default = "default_nav_lock")]
    pub nav_lock_ms: u64,
    /// Lock window after ingestion has been started
    #[serde(default = "default_start_lock")]
    pub start_lock_ms: u64,
    /// Lock window after a cancel
    #[serde(default = "default_cancel_lock")]
    pub cancel_lock_ms: u64,
    /// Wall-clock budget for the post-start warm-up poll
    #[serde(default = "default_warmup_budget")]
    pub warmup_budget_ms: u64,
    /// Sleep between warm-up poll attempts
    #[serde(default = "default_warmup_interval")]
    pub warmup_interval_ms: u64,
    /// Steady-state progress poll interval
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Consecutive failed polls before the run is abandoned (0 = never)
    #[serde(default = "default_max_poll_failures")]
    pub max_poll_failures: u32,
    /// Number of latest emails fetched for the completion summary
    #[serde(default = "default_completion_email_limit")]
    pub completion_email_limit: u32,
    /// Source kind pre-selected when a run begins
    #[serde(default = "default_source")]
    pub default_source: Option<String>,
}

fn default_nav_lock() -> u64 {
    450
}

fn default_start_lock() -> u64 {
    600
}

fn default_cancel_lock() -> u64 {
    800
}

fn default_warmup_budget() -> u64 {
    3000
}

fn default_warmup_interval() -> u64 {
    150
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_max_poll_failures() -> u32 {
    3
}

fn default_completion_email_limit() -> u32 {
    10
}

fn default_source() -> Option<String> {
    Some("emlx".to_string())
}

impl WizardConfig {
    pub fn nav_lock(&self) -> Duration {
        Duration::from_millis(self.nav_lock_ms)
    }

    pub fn start_lock(&self) -> Duration {
        Duration::from_millis(self.start_lock_ms)
    }

    pub fn cancel_lock(&self) -> Duration {
        Duration::from_millis(self.cancel_lock_ms)
    }

    pub fn warmup_budget(&self) -> Duration {
        Duration::from_millis(self.warmup_budget_ms)
    }

    pub fn warmup_interval(&self) -> Duration {
        Duration::from_millis(self.warmup_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            nav_lock_ms: default_nav_lock(),
            start_lock_ms: default_start_lock(),
            cancel_lock_ms: default_cancel_lock(),
            warmup_budget_ms: default_warmup_budget(),
            warmup_interval_ms: default_warmup_interval(),
            poll_interval_ms: default_poll_interval(),
            max_poll_failures: default_max_poll_failures(),
            completion_email_limit: default_completion_email_limit(),
            default_source: default_source(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the workspace registry and logs
    pub state: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let state = dirs::data_dir()
            .map(|dir| dir.join("maillens").to_string_lossy().to_string())
            .unwrap_or_else(|| ".maillens".to_string());
        Self { state }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to log to a file under the state directory instead of stderr
    #[serde(default)]
    pub to_file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: false,
        }
    }
}

impl Config {
    /// Path to the user config file (~/.config/maillens/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("maillens").join("config.toml"))
    }

    pub fn load(config_path: Option<&str>) -> Result<Self> {
        // Start with embedded defaults so maillens works without config files
        let defaults = Config::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize default config")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        if let Some(user_config) = Self::user_config_path() {
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        // Explicit config file (CLI override)
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment variables with MAILLENS_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("MAILLENS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to load configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Save config to the user config location
    pub fn save(&self) -> Result<PathBuf> {
        let config_path =
            Self::user_config_path().context("No user config directory on this platform")?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create maillens config directory")?;
        }

        let toml_str =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        std::fs::write(&config_path, toml_str).context("Failed to write config file")?;

        Ok(config_path)
    }

    /// Get absolute path to state directory
    pub fn state_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.paths.state);
        if path.is_absolute() {
            path
        } else {
            std::env::current_dir().unwrap_or_default().join(path)
        }
    }

    /// Get absolute path to logs directory
    pub fn logs_path(&self) -> PathBuf {
        self.state_path().join("logs")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker: WorkerConfig::default(),
            wizard: WizardConfig::default(),
            paths: PathsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
