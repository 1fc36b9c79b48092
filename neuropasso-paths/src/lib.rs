//! Cross-platform path utilities for NeuroPasso.
//!
//! Single source of truth for where the server keeps its configuration and
//! its records database.
//!
//! # Platform Behavior
//!
//! | Platform | Data Directory | Config Directory |
//! |----------|----------------|------------------|
//! | Linux    | `~/.local/share/neuropasso` | `~/.config/neuropasso` |
//! | macOS    | `~/Library/Application Support/neuropasso` | Same as data dir |
//! | Windows  | `%APPDATA%/neuropasso` | Same as data dir |
//!
//! Setting `NEUROPASSO_HOME` overrides both with a single directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

/// Errors specific to path operations.
#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not determine data directory")]
    NoDataDirectory,

    #[error("Could not determine config directory")]
    NoConfigDirectory,
}

/// Application identifier used in path construction.
const APP_NAME: &str = "neuropasso";

/// Environment variable that relocates every NeuroPasso directory.
pub const HOME_ENV: &str = "NEUROPASSO_HOME";

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Records database file name.
const RECORDS_DB_NAME: &str = "records.db";

fn home_override() -> Option<PathBuf> {
    std::env::var_os(HOME_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Create `dir` (owner-only on Unix) if it is missing.
fn ensure_dir(dir: &Path, what: &str) -> Result<()> {
    if dir.exists() {
        return Ok(());
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {} directory: {}", what, dir.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o700);
        fs::set_permissions(dir, perms)
            .with_context(|| format!("Failed to set permissions on {}", dir.display()))?;
    }

    Ok(())
}

/// Get the application data directory, creating it if needed.
///
/// # Errors
/// Returns an error if the directory cannot be determined or created.
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = match home_override() {
        Some(dir) => dir,
        None => dirs::data_dir().ok_or(PathError::NoDataDirectory)?.join(APP_NAME),
    };

    ensure_dir(&data_dir, "data")?;
    Ok(data_dir)
}

/// Get the configuration directory, creating it if needed.
///
/// # Platform Behavior
/// - **Linux**: `~/.config/neuropasso`
/// - **macOS/Windows**: config lives with data
pub fn get_config_dir() -> Result<PathBuf> {
    if let Some(dir) = home_override() {
        ensure_dir(&dir, "config")?;
        return Ok(dir);
    }

    #[cfg(target_os = "linux")]
    {
        let config_dir = dirs::config_dir()
            .ok_or(PathError::NoConfigDirectory)?
            .join(APP_NAME);
        ensure_dir(&config_dir, "config")?;
        Ok(config_dir)
    }

    #[cfg(not(target_os = "linux"))]
    {
        get_data_dir()
    }
}

/// Get the database directory (`<data_dir>/db`).
pub fn get_db_dir() -> Result<PathBuf> {
    let db_dir = get_data_dir()?.join("db");
    ensure_dir(&db_dir, "database")?;
    Ok(db_dir)
}

/// Default location of the server configuration file.
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Default location of the records database.
pub fn get_records_db_path() -> Result<PathBuf> {
    Ok(get_db_dir()?.join(RECORDS_DB_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_dir_creation() {
        let dir = get_data_dir().expect("Should get data directory");
        assert!(dir.exists(), "Data directory should exist");
        assert!(dir.is_absolute() || home_override().is_some());
    }

    #[test]
    fn test_config_path() {
        let path = get_config_path().expect("Should get config path");
        assert!(path.ends_with("config.toml"));
        assert!(path.parent().unwrap().exists(), "Config directory should exist");
    }

    #[test]
    fn test_records_db_path() {
        let path = get_records_db_path().expect("Should get database path");
        assert!(path.ends_with("records.db"));
        assert!(path.parent().unwrap().ends_with("db"));
    }
}
