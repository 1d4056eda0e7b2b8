//! Control-plane settings.
//!
//! These are the admin tool's own knobs (paths, timeouts, admin listener),
//! not the trading document it manages.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Root settings for the control plane.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ControlSettings {
    /// Canonical document and backup locations.
    pub paths: PathSettings,

    /// Change watcher settings.
    pub watcher: WatcherSettings,

    /// Worker control settings.
    pub workers: WorkerSettings,

    /// Status polling settings.
    pub status: StatusSettings,

    /// Admin API settings.
    pub admin: AdminSettings,

    /// Observability settings.
    pub observability: ObservabilitySettings,
}

/// Paths owned by the persistence layer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathSettings {
    /// Well-known path of the shared configuration document.
    pub config_path: PathBuf,

    /// Directory holding timestamped backups.
    pub backup_dir: PathBuf,

    /// Number of backups kept after pruning.
    pub backup_retention: usize,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/config.toml"),
            backup_dir: PathBuf::from("config/backups"),
            backup_retention: 20,
        }
    }
}

/// Change watcher settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatcherSettings {
    /// Delay between a file event and the reload, in milliseconds.
    pub debounce_ms: u64,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self { debounce_ms: 100 }
    }
}

impl WatcherSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Worker identification and control settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Container label key identifying stack workers.
    pub label_key: String,

    /// Container label value identifying stack workers.
    pub label_value: String,

    /// Signal delivered after unpause so workers reload the document.
    pub reload_signal: String,

    /// Per-worker deadline for a single pause/unpause/signal call.
    pub operation_timeout_ms: u64,

    /// Attempts per worker call, including the first.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            label_key: "app".to_string(),
            label_value: "ibkr-trader".to_string(),
            reload_signal: "SIGUSR1".to_string(),
            operation_timeout_ms: 5_000,
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        }
    }
}

impl WorkerSettings {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

/// Status aggregation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StatusSettings {
    /// Poll interval in seconds.
    pub poll_interval_secs: u64,

    /// Timeout for the broker reachability probe in milliseconds.
    pub upstream_timeout_ms: u64,

    /// Timeout for listing workers in milliseconds.
    pub list_timeout_ms: u64,
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            upstream_timeout_ms: 2_000,
            list_timeout_ms: 5_000,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminSettings {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,

    /// Request timeout in seconds. Must cover a full save-and-apply cycle.
    pub request_timeout_secs: u64,
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl AdminSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilitySettings {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Error type for settings loading.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Load settings from a TOML file.
pub fn load_settings(path: &Path) -> Result<ControlSettings, SettingsError> {
    let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_settings_fill_defaults() {
        let settings: ControlSettings =
            toml::from_str("[workers]\nreload_signal = \"SIGHUP\"\n").unwrap();
        assert_eq!(settings.workers.reload_signal, "SIGHUP");
        assert_eq!(settings.workers.label_value, "ibkr-trader");
        assert_eq!(settings.watcher.debounce(), Duration::from_millis(100));
    }

    #[test]
    fn test_missing_settings_file_is_io_error() {
        let err = load_settings(Path::new("/nonexistent/settings.toml")).unwrap_err();
        assert!(matches!(err, SettingsError::Io { .. }));
    }
}
