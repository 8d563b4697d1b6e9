//! Storage configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CoreError;
use crate::Result;

pub const DATA_DIR_ENV: &str = "TOME_DATA_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding one SQLite file per database name
    pub data_dir: PathBuf,
    /// How long a transaction waits on a locked database file
    pub busy_timeout_ms: u64,
}

impl Config {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            busy_timeout_ms: 5_000,
        }
    }

    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(CoreError::Config("data_dir must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn data_dir() -> PathBuf {
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
            return PathBuf::from(dir);
        }
        dirs::data_local_dir()
            .map(|d| d.join("tome"))
            .unwrap_or_else(|| PathBuf::from(".tome"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::data_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tome.json");
        std::fs::write(&path, r#"{ "data_dir": "/var/lib/tome" }"#).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/tome"));
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_data_dir_resolution() {
        std::env::set_var(DATA_DIR_ENV, "/srv/tome");
        assert_eq!(Config::data_dir(), PathBuf::from("/srv/tome"));

        std::env::remove_var(DATA_DIR_ENV);
        let fallback = Config::data_dir();
        match dirs::data_local_dir() {
            Some(base) => assert_eq!(fallback, base.join("tome")),
            None => assert_eq!(fallback, PathBuf::from(".tome")),
        }
    }

    #[test]
    fn test_from_file_errors() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::from_file(dir.path().join("missing.json")),
            Err(CoreError::Config(_))
        ));

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(CoreError::Serialization(_))
        ));

        std::fs::write(&path, r#"{ "data_dir": "" }"#).unwrap();
        assert!(matches!(Config::from_file(&path), Err(CoreError::Config(_))));
    }
}
