use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::notify::Thresholds;
use crate::usage::Period;

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "CLAUDOMETER_DATA";

/// Lowest accepted poll interval in seconds
pub const MIN_POLL_INTERVAL_SECS: u64 = 30;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Claude usage monitor")]
pub struct Config {
    /// Enable debug mode
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Polling interval in seconds
    #[arg(short = 'i', long, global = true)]
    pub poll_interval: Option<u64>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run the monitor in the foreground (default)
    Run,
    /// Poll once, print the current status and exit
    Check,
    /// Write a default config file and print its path
    Init,
}

impl Config {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Selected subcommand, `run` when omitted
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Run)
    }
}

/// Application settings (from config file)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// claude.ai organization UUID
    #[serde(default)]
    pub organization_id: String,

    /// Value of the `sessionKey` browser cookie
    #[serde(default)]
    pub session_cookie: String,

    /// Base polling interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,

    /// Utilization percentages that trigger a notification
    #[serde(default)]
    pub notification_thresholds: Thresholds,

    /// Usage windows watched for notifications and shown in the tooltip
    #[serde(default = "default_notification_periods")]
    pub notification_periods: Vec<Period>,

    /// Verbose logging to file and stderr
    #[serde(default)]
    pub debug_mode: bool,

    /// Usage endpoint settings
    #[serde(default)]
    pub api: ApiSettings,

    /// Notification delivery settings
    #[serde(default)]
    pub notifications: NotificationSettings,
}

fn default_poll_interval() -> u64 {
    300
}

fn default_notification_periods() -> Vec<Period> {
    vec![Period::FiveHour, Period::SevenDay]
}

/// Usage endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// API root; the usage URL is `{base_url}/organizations/{id}/usage`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://claude.ai/api".to_string()
}

fn default_timeout() -> u64 {
    15
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Notification delivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Show desktop notifications (log-only when false or unavailable)
    #[serde(default = "default_desktop")]
    pub desktop: bool,
}

fn default_desktop() -> bool {
    true
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            desktop: default_desktop(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            organization_id: String::new(),
            session_cookie: String::new(),
            poll_interval_seconds: default_poll_interval(),
            notification_thresholds: Thresholds::default(),
            notification_periods: default_notification_periods(),
            debug_mode: false,
            api: ApiSettings::default(),
            notifications: NotificationSettings::default(),
        }
    }
}

/// Directory holding the config file and logs.
///
/// `$CLAUDOMETER_DATA` if set, else the platform config dir, else
/// `~/.claudometer`.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("claudometer");
    }
    dirs::home_dir()
        .map(|home| home.join(".claudometer"))
        .unwrap_or_else(|| PathBuf::from(".claudometer"))
}

/// Default config file location
pub fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}

/// Log directory
pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

impl Settings {
    /// Config path to use: the CLI override, else the default location
    pub fn resolve_path(path: Option<&PathBuf>) -> PathBuf {
        path.cloned().unwrap_or_else(config_path)
    }

    /// Load settings from the resolved config path or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        Self::load_from(&Self::resolve_path(path))
    }

    /// Load settings from a file; a missing file yields defaults.
    ///
    /// Runs before logging is installed, so it logs nothing itself; see
    /// [`Settings::describe_source`].
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Where settings for `path` come from, for the startup log
    pub fn describe_source(path: &Path) -> String {
        if path.exists() {
            format!("Loaded config from {:?}", path)
        } else {
            format!("No config file at {:?}, using defaults", path)
        }
    }

    /// Write settings as pretty TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        // The file holds a session cookie
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to restrict config permissions: {:?}", path))?;
        }

        info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Both credentials are present
    pub fn is_configured(&self) -> bool {
        !self.organization_id.trim().is_empty() && !self.session_cookie.trim().is_empty()
    }

    /// Merge CLI config into settings (CLI takes precedence)
    pub fn merge_cli(&mut self, cli: &Config) {
        if let Some(poll_interval) = cli.poll_interval {
            self.poll_interval_seconds = poll_interval;
        }
        if cli.debug {
            self.debug_mode = true;
        }
    }

    /// Validate and normalize settings values
    pub fn validate(&mut self) {
        if self.poll_interval_seconds < MIN_POLL_INTERVAL_SECS {
            warn!(
                "poll_interval_seconds {} below minimum, using {}",
                self.poll_interval_seconds, MIN_POLL_INTERVAL_SECS
            );
            self.poll_interval_seconds = MIN_POLL_INTERVAL_SECS;
        }
        if self.api.timeout_secs == 0 {
            self.api.timeout_secs = default_timeout();
        }
        self.organization_id = self.organization_id.trim().to_string();
        self.session_cookie = self.session_cookie.trim().to_string();
    }
}
