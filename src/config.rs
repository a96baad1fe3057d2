//! Configuration file and CLI override merging
//!
//! Settings come from three layers: built-in defaults, an optional TOML file
//! (`<config dir>/hordelog/config.toml` or `--config`), and command line flags.
//! Later layers win.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use hordelog_logs::DEFAULT_POLL_INTERVAL;

/// Lines requested per fetch unless configured otherwise
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// Contents of the configuration file
#[derive(Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Server root, e.g. `https://horde.example.com`
    pub server_url: Option<String>,
    pub token: Option<String>,
    /// Seconds between liveness checks; 0 disables polling
    pub poll_interval_secs: Option<u64>,
    pub page_size: Option<usize>,
}

impl FileConfig {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        let dir = dirs::config_dir()?;
        Some(dir.join("hordelog").join("config.toml"))
    }

    /// Parse the file at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Load an explicitly named file, or the default one if it exists
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }
}

/// Values taken from the command line; `None` defers to the file
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub server_url: Option<String>,
    pub token: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub page_size: Option<usize>,
}

/// Effective settings after merging every layer
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub server_url: Option<String>,
    pub token: Option<String>,
    pub poll_interval: Duration,
    pub page_size: usize,
}

impl Settings {
    pub fn resolve(cli: CliOverrides, file: FileConfig) -> Self {
        let poll_interval = cli
            .poll_interval_secs
            .or(file.poll_interval_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL);

        Self {
            server_url: cli.server_url.or(file.server_url),
            token: cli.token.or(file.token),
            poll_interval,
            page_size: cli
                .page_size
                .or(file.page_size)
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_apply_without_file() {
        let settings = Settings::resolve(CliOverrides::default(), FileConfig::default());
        assert_eq!(settings.server_url, None);
        assert_eq!(settings.poll_interval, Duration::from_secs(10));
        assert_eq!(settings.page_size, 500);
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = FileConfig {
            server_url: Some("https://horde.internal".to_string()),
            token: Some("file-token".to_string()),
            poll_interval_secs: Some(30),
            page_size: Some(200),
        };
        let cli = CliOverrides {
            token: Some("cli-token".to_string()),
            poll_interval_secs: Some(0),
            ..Default::default()
        };

        let settings = Settings::resolve(cli, file);
        assert_eq!(settings.server_url.as_deref(), Some("https://horde.internal"));
        assert_eq!(settings.token.as_deref(), Some("cli-token"));
        assert_eq!(settings.poll_interval, Duration::ZERO);
        assert_eq!(settings.page_size, 200);
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "server_url = \"https://horde.example.com\"\npoll_interval_secs = 5"
        )
        .unwrap();

        let config = FileConfig::load_or_default(Some(file.path())).unwrap();
        assert_eq!(config.server_url.as_deref(), Some("https://horde.example.com"));
        assert_eq!(config.poll_interval_secs, Some(5));
        assert_eq!(config.token, None);
    }

    #[test]
    fn test_load_rejects_bad_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sever_url = \"typo\"").unwrap();
        assert!(FileConfig::load(file.path()).is_err());

        let dir = tempfile::tempdir().unwrap();
        assert!(FileConfig::load_or_default(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
