//! Configuration types for aquant services.
//!
//! Configuration is read from `~/.aquant/config.json`, merged with the
//! optional modular `trading.json`, and finally patched by environment
//! variables. Every field has a default so an empty (or missing) file is a
//! valid configuration.
//!
//! ```json
//! {
//!   "server": { "host": "127.0.0.1", "port": 4480 },
//!   "observability": { "log_level": "info", "log_format": "pretty" },
//!   "data": { "replay_path": "~/.aquant/replay/2024-05-10.jsonl" },
//!   "trading": {
//!     "capital": 200000,
//!     "halfway": { "min_volume_ratio": 2.0 },
//!     "orchestrator": { "buy_threshold": 70 }
//!   }
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config_loader::load_modular_config;

/// Get the configuration directory (`~/.aquant`).
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".aquant"),
        |dirs| dirs.home_dir().join(".aquant"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Expand a leading `~` to the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

// ============================================================================
// Server / Observability
// ============================================================================

/// HTTP server configuration for the dashboard API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    4480
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to quiet down to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

// ============================================================================
// Data
// ============================================================================

/// Data source and persistence locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory for the watchlist and signal journal (default `~/.aquant/data`)
    #[serde(default)]
    pub data_dir: Option<String>,

    /// JSON-lines file of recorded snapshots to replay instead of live quotes
    #[serde(default)]
    pub replay_path: Option<String>,

    /// Watchlist file override
    #[serde(default)]
    pub watchlist_path: Option<String>,

    /// Signal journal (SQLite) override
    #[serde(default)]
    pub journal_path: Option<String>,

    /// Whether decisions are written to the journal
    #[serde(default = "default_true")]
    pub journal_enabled: bool,

    /// Number of stocks in the built-in sample market
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

fn default_true() -> bool {
    true
}

fn default_sample_size() -> usize {
    100
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            replay_path: None,
            watchlist_path: None,
            journal_path: None,
            journal_enabled: true,
            sample_size: default_sample_size(),
        }
    }
}

// ============================================================================
// Trading
// ============================================================================

/// Monitor loop overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorSection {
    #[serde(default)]
    pub interval_secs: Option<u64>,
    #[serde(default)]
    pub morning_start: Option<String>,
    #[serde(default)]
    pub morning_end: Option<String>,
    #[serde(default)]
    pub afternoon_start: Option<String>,
    #[serde(default)]
    pub afternoon_end: Option<String>,
    /// Cron expression for the end-of-day roll
    #[serde(default)]
    pub eod_schedule: Option<String>,
    #[serde(default)]
    pub max_symbols_per_cycle: Option<usize>,
    #[serde(default)]
    pub dedup_window_secs: Option<u64>,
    #[serde(default)]
    pub max_signals_per_symbol: Option<usize>,
    /// Decisions kept in memory for the dashboard
    #[serde(default)]
    pub history_size: Option<usize>,
}

/// Halfway breakout detector overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HalfwaySection {
    #[serde(default)]
    pub min_band_fraction: Option<f64>,
    #[serde(default)]
    pub max_band_fraction: Option<f64>,
    #[serde(default)]
    pub min_volume_ratio: Option<f64>,
    #[serde(default)]
    pub min_momentum_pct: Option<f64>,
    #[serde(default)]
    pub momentum_ticks: Option<usize>,
    #[serde(default)]
    pub max_gap_pct: Option<f64>,
    /// Required premium of price over VWAP, percent
    #[serde(default)]
    pub vwap_premium_pct: Option<f64>,
    /// Minimum distance left to the limit-up price, percent
    #[serde(default)]
    pub min_room_to_limit_pct: Option<f64>,
    /// Latest trigger time (HH:MM)
    #[serde(default)]
    pub latest_time: Option<String>,
    #[serde(default)]
    pub min_score: Option<f64>,
}

/// Dip-buy detector overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DipSection {
    #[serde(default)]
    pub min_pullback_pct: Option<f64>,
    #[serde(default)]
    pub min_change_pct: Option<f64>,
    #[serde(default)]
    pub max_change_pct: Option<f64>,
    #[serde(default)]
    pub support_tolerance_pct: Option<f64>,
    #[serde(default)]
    pub shrink_ratio: Option<f64>,
    /// Floor for big-order net flow, percent of turnover
    #[serde(default)]
    pub max_dde_outflow_ratio: Option<f64>,
    #[serde(default)]
    pub min_score: Option<f64>,
}

/// Market cycle overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleSection {
    #[serde(default)]
    pub ice_threshold: Option<f64>,
    #[serde(default)]
    pub ferment_threshold: Option<f64>,
    #[serde(default)]
    pub climax_threshold: Option<f64>,
    #[serde(default)]
    pub ebb_drop: Option<f64>,
    /// Allow new positions in Ice/Ebb phases
    #[serde(default)]
    pub aggressive: Option<bool>,
}

/// Theme tracker overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThemeSection {
    #[serde(default)]
    pub top_n: Option<usize>,
    #[serde(default)]
    pub hot_threshold: Option<f64>,
}

/// Orchestrator overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorSection {
    #[serde(default)]
    pub buy_threshold: Option<f64>,
    #[serde(default)]
    pub base_position: Option<f64>,
    #[serde(default)]
    pub max_single_position: Option<f64>,
    #[serde(default)]
    pub max_total_exposure: Option<f64>,
    #[serde(default)]
    pub max_daily_buys: Option<usize>,
    #[serde(default)]
    pub min_sentiment: Option<f64>,
    #[serde(default)]
    pub require_hot_theme: Option<bool>,
    #[serde(default)]
    pub stop_loss_pct: Option<f64>,
    #[serde(default)]
    pub take_profit_pct: Option<f64>,
    #[serde(default)]
    pub trailing_stop_pct: Option<f64>,
    /// Veto entries this close (percent) to the limit-down price
    #[serde(default)]
    pub near_limit_down_pct: Option<f64>,
    #[serde(default)]
    pub halfway_weight: Option<f64>,
    #[serde(default)]
    pub dip_weight: Option<f64>,
    #[serde(default)]
    pub sentiment_weight: Option<f64>,
    #[serde(default)]
    pub theme_weight: Option<f64>,
}

/// Trading configuration. Every value is optional; the trading crate
/// supplies the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Starting capital for position sizing (CNY)
    #[serde(default)]
    pub capital: Option<f64>,
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub halfway: HalfwaySection,
    #[serde(default)]
    pub dip: DipSection,
    #[serde(default)]
    pub cycle: CycleSection,
    #[serde(default)]
    pub theme: ThemeSection,
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
}

// ============================================================================
// Root Config
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub trading: TradingConfig,
}

impl Config {
    /// Load configuration from the default directory and apply env overrides.
    pub fn load() -> Result<Self> {
        Self::load_from_dir(&config_dir())
    }

    /// Load `config.json` + `trading.json` from a directory and apply env overrides.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let value = load_modular_config(Some(dir.to_path_buf()))?;
        let mut config: Self = serde_json::from_value(value)
            .with_context(|| format!("Failed to parse config from {}", dir.display()))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a single file, without env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("AQUANT_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(format) = std::env::var("AQUANT_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Ok(port) = std::env::var("AQUANT_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(bind) = std::env::var("AQUANT_BIND") {
            self.server.host = bind;
        }
        if let Ok(dir) = std::env::var("AQUANT_DATA_DIR") {
            self.data.data_dir = Some(dir);
        }
        if let Ok(path) = std::env::var("AQUANT_REPLAY_PATH") {
            self.data.replay_path = Some(path);
        }
    }

    /// Directory for persisted files.
    pub fn data_dir(&self) -> PathBuf {
        self.data
            .data_dir
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(|| config_dir().join("data"))
    }

    /// Watchlist file location.
    pub fn watchlist_path(&self) -> PathBuf {
        self.data
            .watchlist_path
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(|| self.data_dir().join("watchlist.json"))
    }

    /// Signal journal location.
    pub fn journal_path(&self) -> PathBuf {
        self.data
            .journal_path
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(|| self.data_dir().join("signals.db"))
    }

    /// Replay file location, if configured.
    pub fn replay_path(&self) -> Option<PathBuf> {
        self.data.replay_path.as_deref().map(expand_home)
    }

    /// Listen address as `host:port`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.server.port, 4480);
        assert_eq!(config.observability.log_level, "info");
        assert_eq!(config.data.sample_size, 100);
        assert!(config.data.journal_enabled);
        assert!(config.trading.capital.is_none());
    }

    #[test]
    fn test_partial_trading_section() {
        let config: Config = serde_json::from_str(
            r#"{"trading": {"capital": 50000, "halfway": {"min_volume_ratio": 2.5}}}"#,
        )
        .unwrap();
        assert_eq!(config.trading.capital, Some(50000.0));
        assert_eq!(config.trading.halfway.min_volume_ratio, Some(2.5));
        assert!(config.trading.dip.min_score.is_none());
    }

    #[test]
    fn test_observability_aliases() {
        let config: Config =
            serde_json::from_str(r#"{"observability": {"level": "debug", "format": "json"}}"#)
                .unwrap();
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_paths_follow_data_dir() {
        let mut config = Config::default();
        config.data.data_dir = Some("/tmp/aquant-test".into());
        assert_eq!(config.watchlist_path(), PathBuf::from("/tmp/aquant-test/watchlist.json"));
        assert_eq!(config.journal_path(), PathBuf::from("/tmp/aquant-test/signals.db"));

        config.data.journal_path = Some("/var/lib/aquant/j.db".into());
        assert_eq!(config.journal_path(), PathBuf::from("/var/lib/aquant/j.db"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"server": {"port": 9000}}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.bind_address(), "127.0.0.1:9000");
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();

        assert!(Config::load_from(&path).is_err());
    }
}
