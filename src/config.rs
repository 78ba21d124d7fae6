//! Configuration file support for the JS8Call monitor.
//!
//! Loads settings from `~/.config/js8-monitor/config.toml` on Linux
//! (or platform-appropriate location on other OSes).

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::info::StatusStyles;

/// Grid length used when the configured one is out of range.
pub const DEFAULT_GRID_LENGTH: usize = 6;

/// The station running the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Operator callsign; also logged as the station callsign.
    pub operator: String,

    /// The station's own grid square.
    pub my_gridsquare: String,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            operator: "N0CALL".to_string(),
            my_gridsquare: String::new(),
        }
    }
}

/// Where JS8Call's UDP API events arrive.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 2242,
        }
    }
}

/// Which directed messages get forwarded, and how grids are handled.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GridsConfig {
    /// Take the grid (and a missing call) from INFO text.
    pub from_info: bool,

    /// Maximum grid length sent downstream, 1 to 11.
    pub grid_length: usize,

    /// Forward SNR reports even when they are not about us.
    pub map_all: bool,
    pub map_cq: bool,
    pub map_heartbeat: bool,
    pub map_info: bool,
    pub map_status: bool,
    pub map_log: bool,
    pub map_qso: bool,
    pub map_snr: bool,

    /// Exit when JS8Call closes.
    pub auto_close: bool,
}

impl Default for GridsConfig {
    fn default() -> Self {
        Self {
            from_info: false,
            grid_length: DEFAULT_GRID_LENGTH,
            map_all: false,
            map_cq: true,
            map_heartbeat: true,
            map_info: true,
            map_status: true,
            map_log: true,
            map_qso: true,
            map_snr: true,
            auto_close: false,
        }
    }
}

impl GridsConfig {
    /// The configured grid length, or the default when it is out of range.
    pub fn effective_grid_length(&self) -> usize {
        if (1..=11).contains(&self.grid_length) {
            self.grid_length
        } else {
            DEFAULT_GRID_LENGTH
        }
    }
}

/// Grid lookup sources.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Directory holding the `JS8monitor_*.dat` files.
    pub location: PathBuf,

    pub fcc: bool,
    pub hamcall_cd: bool,
    pub rac_cd: bool,
    pub local: bool,

    /// Write online hits back to the local database.
    pub local_learn: bool,

    /// Record calls no source could place.
    pub collect_rejects: bool,

    pub callook: bool,
    pub hamcall_online: bool,
    pub hamcall_username: String,
    pub hamcall_password: String,

    /// Per-lookup timeout in seconds.
    pub lookup_timeout: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            location: PathBuf::from("."),
            fcc: false,
            hamcall_cd: false,
            rac_cd: false,
            local: true,
            local_learn: true,
            collect_rejects: false,
            callook: false,
            hamcall_online: false,
            hamcall_username: String::new(),
            hamcall_password: String::new(),
            lookup_timeout: 5,
        }
    }
}

impl DatabaseConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout)
    }

    /// Learning needs the local database.
    pub fn learning(&self) -> bool {
        self.local && self.local_learn
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct N1mmConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for N1mmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 12060,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GridTrackerConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for GridTrackerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 2237,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeoServerConfig {
    /// Post INFO and STATUS text to the legend.
    pub enabled_msg: bool,

    /// Plot grid spots.
    pub enabled_spot: bool,

    pub host: String,
    pub port: u16,
    pub token: String,
}

impl Default for GeoServerConfig {
    fn default() -> Self {
        Self {
            enabled_msg: false,
            enabled_spot: false,
            host: "127.0.0.1".to_string(),
            port: 8889,
            token: String::new(),
        }
    }
}

impl GeoServerConfig {
    pub fn enabled(&self) -> bool {
        self.enabled_msg || self.enabled_spot
    }
}

/// A log file sink.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogFileConfig {
    pub enabled: bool,
    pub logfile: PathBuf,
}

impl LogFileConfig {
    fn with_file(logfile: &str) -> Self {
        Self {
            enabled: false,
            logfile: PathBuf::from(logfile),
        }
    }
}

impl Default for LogFileConfig {
    fn default() -> Self {
        Self::with_file("js8monitor.log")
    }
}

/// Shared token required on client commands.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub token: String,
}

impl AuthConfig {
    /// Whether a command carrying `token` may pass.
    pub fn permits(&self, token: Option<&str>) -> bool {
        !self.enabled || token == Some(self.token.as_str())
    }
}

/// E-mail alerts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,

    /// Login is used only when both user and password are set.
    pub user: String,
    pub password: String,

    pub mail_from: String,
    pub mail_to: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: 25,
            user: String::new(),
            password: String::new(),
            mail_from: String::new(),
            mail_to: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics HTTP endpoint.
    pub enabled: bool,

    /// Port for Prometheus metrics HTTP endpoint.
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub station: StationConfig,
    pub listener: ListenerConfig,
    pub grids: GridsConfig,
    pub styles: StatusStyles,
    pub databases: DatabaseConfig,
    pub n1mm: N1mmConfig,
    pub gridtracker: GridTrackerConfig,
    pub geoserver: GeoServerConfig,
    pub aprs: LogFileConfig,
    pub adif: LogFileConfig,
    pub auth: AuthConfig,
    pub smtp: SmtpConfig,
    pub metrics: MetricsConfig,

    /// Print statistics every N seconds; 0 disables.
    pub stats_interval: u64,

    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,

    /// Also write logs to this file.
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            station: StationConfig::default(),
            listener: ListenerConfig::default(),
            grids: GridsConfig::default(),
            styles: StatusStyles::default(),
            databases: DatabaseConfig::default(),
            n1mm: N1mmConfig::default(),
            gridtracker: GridTrackerConfig::default(),
            geoserver: GeoServerConfig::default(),
            aprs: LogFileConfig::with_file("js8monitor_aprs.log"),
            adif: LogFileConfig::with_file("js8monitor.adi"),
            auth: AuthConfig::default(),
            smtp: SmtpConfig::default(),
            metrics: MetricsConfig::default(),
            stats_interval: 300,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from the default config file location.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but is malformed.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Config::default()),
        }
    }

    /// Load configuration from `path`, falling back to defaults when the
    /// file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in config file: {}", path.display()))
    }

    /// Returns the path to the config file.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("js8-monitor/config.toml"))
    }

    /// Validate all configuration settings.
    ///
    /// An out of range grid length only warns; it falls back to the default.
    pub fn validate(&self) -> Result<()> {
        if self.grids.effective_grid_length() != self.grids.grid_length {
            warn!(
                "grid_length {} out of range, using {}",
                self.grids.grid_length, DEFAULT_GRID_LENGTH
            );
        }
        if self.station.operator.trim().is_empty() {
            bail!("station.operator must be set");
        }
        if self.auth.enabled && self.auth.token.is_empty() {
            bail!("auth is enabled but auth.token is empty");
        }
        if self.smtp.enabled && (self.smtp.mail_from.is_empty() || self.smtp.mail_to.is_empty()) {
            bail!("smtp is enabled but mail_from or mail_to is empty");
        }
        if self.databases.hamcall_online && self.databases.hamcall_username.is_empty() {
            bail!("hamcall_online needs hamcall_username");
        }
        if self.databases.lookup_timeout == 0 {
            bail!("databases.lookup_timeout must be at least 1 second");
        }
        Ok(())
    }
}
