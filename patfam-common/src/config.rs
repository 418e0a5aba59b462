//! Configuration file resolution and loading

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable consulted when no `--config` argument is given
pub const CONFIG_ENV_VAR: &str = "PATFAM_CONFIG";

/// File name looked up under the user configuration directory
pub const DEFAULT_CONFIG_FILE: &str = "ingest.toml";

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Where a configuration path came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// `--config` on the command line
    CommandLine(PathBuf),
    /// `PATFAM_CONFIG` environment variable
    Environment(PathBuf),
    /// `<config dir>/patfam/ingest.toml`, present on disk
    UserDefault(PathBuf),
    /// Nothing found; built-in defaults apply
    BuiltIn,
}

impl ConfigSource {
    /// Path to read, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::CommandLine(p) | Self::Environment(p) | Self::UserDefault(p) => Some(p),
            Self::BuiltIn => None,
        }
    }

    /// Whether the path was named explicitly (a missing file is then fatal)
    pub fn is_explicit(&self) -> bool {
        matches!(self, Self::CommandLine(_) | Self::Environment(_))
    }
}

/// Resolve the run configuration path.
///
/// Priority order:
/// 1. Command-line argument (highest priority)
/// 2. `PATFAM_CONFIG` environment variable
/// 3. `<user config dir>/patfam/ingest.toml` if it exists
/// 4. Built-in defaults
pub fn resolve_config_path(cli_arg: Option<&Path>) -> ConfigSource {
    if let Some(path) = cli_arg {
        return ConfigSource::CommandLine(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return ConfigSource::Environment(PathBuf::from(path));
        }
    }

    if let Some(path) = dirs::config_dir().map(|d| d.join("patfam").join(DEFAULT_CONFIG_FILE)) {
        if path.exists() {
            return ConfigSource::UserDefault(path);
        }
    }

    ConfigSource::BuiltIn
}

/// Read and deserialize a TOML file.
///
/// Unreadable files and invalid TOML both surface as `Error::Config` so the
/// caller can treat them as fatal before any fetch begins.
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    debug!(path = %path.display(), "Loading TOML configuration");

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
    })?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
}

/// Write bytes to `path` atomically (temp file in the same directory + rename).
///
/// Readers never observe a partially written file, so an interrupted run
/// leaves either the previous content or the complete new content.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| Error::InvalidInput(format!("Not a file path: {}", path.display())))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(format!(".{}.tmp", std::process::id()));
    let tmp_path = path.with_file_name(tmp_name);

    std::fs::write(&tmp_path, bytes)?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(Error::Io(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
        #[serde(default)]
        logging: LoggingConfig,
    }

    #[test]
    fn test_cli_argument_wins() {
        let source = resolve_config_path(Some(Path::new("/tmp/run.toml")));
        assert_eq!(source, ConfigSource::CommandLine(PathBuf::from("/tmp/run.toml")));
        assert!(source.is_explicit());
    }

    #[test]
    fn test_load_toml_defaults_logging() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, "name = \"x\"\n").unwrap();

        let sample: Sample = load_toml(&path).unwrap();
        assert_eq!(sample.name, "x");
        assert_eq!(sample.logging.level, "info");
    }

    #[test]
    fn test_load_toml_missing_file_is_config_error() {
        let err = load_toml::<Sample>(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_toml_invalid_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "name = [unclosed").unwrap();

        let err = load_toml::<Sample>(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.json");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "temp file should be renamed away");
    }
}
