//! Configuration management

use anyhow::{bail, Context, Result};
use neuropasso_broadcaster::ViewerOptions;
use neuropasso_telemetry::DEFAULT_DEVICES;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Daemon configuration
///
/// Missing keys in the file fall back to their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Path to configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// UDP address the leg nodes send to
    pub udp_bind: String,

    /// TCP address viewers connect to
    pub viewer_bind: String,

    /// Device identifiers accepted from the wire (left leg first)
    pub known_devices: Vec<String>,

    /// Updates buffered per viewer before that viewer starts missing some
    pub viewer_queue_capacity: usize,

    /// Per-line write timeout before a stalled viewer is dropped (ms)
    pub viewer_write_timeout_ms: u64,

    /// Pause after a receive error before retrying (ms)
    pub receive_backoff_ms: u64,

    /// Silence after which a node is reported disconnected (ms)
    pub stale_after_ms: u64,

    /// Interval between status log lines (s, 0 disables)
    pub status_interval_secs: u64,

    /// Records database path (None = platform data dir)
    pub database_path: Option<String>,

    /// Default log filter when RUST_LOG is unset
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            udp_bind: "0.0.0.0:4210".to_string(),
            viewer_bind: "0.0.0.0:8765".to_string(),
            known_devices: DEFAULT_DEVICES.iter().map(|id| id.to_string()).collect(),
            viewer_queue_capacity: 64,
            viewer_write_timeout_ms: 2000,
            receive_backoff_ms: 100,
            stale_after_ms: 1000,
            status_interval_secs: 10,
            database_path: None,
            log_level: "info".to_string(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default location, or create it
    pub fn load() -> Result<Self> {
        let config_path = neuropasso_paths::get_config_path()
            .context("Failed to resolve config path")?;
        Self::load_from(config_path)
    }

    /// Load configuration from `path`, writing defaults there if it is missing
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config_path = path.as_ref().to_path_buf();

        let config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let mut config: DaemonConfig = toml::from_str(&contents)
                .context("Failed to parse config file")?;

            config.config_path = config_path;
            config
        } else {
            let config = Self {
                config_path,
                ..Self::default()
            };
            config.save()
                .context("Failed to save default config")?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(&self.config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.known_devices.is_empty() {
            bail!("known_devices must name at least one device");
        }
        if self.known_devices.iter().any(|id| id.is_empty() || id.contains(',')) {
            bail!("Device identifiers must be non-empty and contain no commas");
        }
        if self.viewer_queue_capacity == 0 {
            bail!("viewer_queue_capacity must be at least 1");
        }
        if self.viewer_write_timeout_ms == 0 {
            bail!("viewer_write_timeout_ms must be at least 1");
        }
        Ok(())
    }

    pub fn viewer_options(&self) -> ViewerOptions {
        ViewerOptions {
            queue_capacity: self.viewer_queue_capacity,
            write_timeout: Duration::from_millis(self.viewer_write_timeout_ms),
            ..ViewerOptions::default()
        }
    }

    pub fn receive_backoff(&self) -> Duration {
        Duration::from_millis(self.receive_backoff_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }

    /// Status logging interval, if enabled
    pub fn status_interval(&self) -> Option<Duration> {
        (self.status_interval_secs > 0).then(|| Duration::from_secs(self.status_interval_secs))
    }

    /// Records database location
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => neuropasso_paths::get_records_db_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("conf").join("config.toml");

        let config = DaemonConfig::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.config_path, path);
        assert_eq!(config.udp_bind, "0.0.0.0:4210");
        assert_eq!(config.known_devices, vec!["ESQ".to_string(), "DIR".to_string()]);

        let reloaded = DaemonConfig::load_from(&path).unwrap();
        assert_eq!(reloaded.viewer_bind, config.viewer_bind);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "udp_bind = \"127.0.0.1:9000\"\nstale_after_ms = 2500\n").unwrap();

        let config = DaemonConfig::load_from(&path).unwrap();
        assert_eq!(config.udp_bind, "127.0.0.1:9000");
        assert_eq!(config.stale_after(), Duration::from_millis(2500));
        assert_eq!(config.viewer_queue_capacity, 64);
        assert_eq!(config.receive_backoff(), Duration::from_millis(100));
    }

    #[test]
    fn test_invalid_files_are_rejected() {
        let tmp = TempDir::new().unwrap();

        let garbled = tmp.path().join("garbled.toml");
        std::fs::write(&garbled, "udp_bind = [").unwrap();
        assert!(DaemonConfig::load_from(&garbled).is_err());

        let no_devices = tmp.path().join("empty.toml");
        std::fs::write(&no_devices, "known_devices = []\n").unwrap();
        assert!(DaemonConfig::load_from(&no_devices).is_err());

        let zero_queue = tmp.path().join("queue.toml");
        std::fs::write(&zero_queue, "viewer_queue_capacity = 0\n").unwrap();
        assert!(DaemonConfig::load_from(&zero_queue).is_err());
    }

    #[test]
    fn test_derived_settings() {
        let mut config = DaemonConfig::default();
        assert_eq!(config.status_interval(), Some(Duration::from_secs(10)));
        config.status_interval_secs = 0;
        assert_eq!(config.status_interval(), None);

        let options = config.viewer_options();
        assert_eq!(options.queue_capacity, 64);
        assert_eq!(options.write_timeout, Duration::from_secs(2));

        config.database_path = Some("/tmp/records.db".to_string());
        assert_eq!(config.database_path().unwrap(), PathBuf::from("/tmp/records.db"));
    }
}
