//! Console configuration and its JSON file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::buffer::DEFAULT_MAX_EVENTS;
use super::cache::write_atomic;
use super::logs::DEFAULT_MAX_SCRIPT_LOGS;
use crate::script::DEFAULT_STEP_LIMIT;

/// Default configuration file name
pub const CONFIG_FILE: &str = "tapline.json";

/// Console configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// WebSocket URL of the event source
    pub event_source: String,

    /// Address (`host:port`) of the persistence service; `None` keeps
    /// everything in process
    pub store_addr: Option<String>,

    /// Directory of the local fallback cache (default: .tapline/cache)
    pub cache_dir: PathBuf,

    /// Events retained in the buffer
    pub max_events: usize,

    /// Script log records retained
    pub max_script_logs: usize,

    /// Evaluation steps allowed per script invocation
    pub script_step_limit: usize,

    /// Notices buffered per subscriber before the slowest one lags
    pub notice_capacity: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            event_source: "ws://127.0.0.1:12582/ws".to_string(),
            store_addr: None,
            cache_dir: PathBuf::from(".tapline/cache"),
            max_events: DEFAULT_MAX_EVENTS,
            max_script_logs: DEFAULT_MAX_SCRIPT_LOGS,
            script_step_limit: DEFAULT_STEP_LIMIT,
            notice_capacity: 256,
        }
    }
}

/// Write configuration to `path`
pub fn write_config(path: &Path, config: &ConsoleConfig) -> Result<()> {
    let json = serde_json::to_vec_pretty(config).context("Failed to serialize config")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }
    write_atomic(path, &json).with_context(|| format!("Failed to write config: {:?}", path))?;

    Ok(())
}

/// Load configuration from `path`
pub fn load_config(path: &Path) -> Result<ConsoleConfig> {
    let data = fs::read(path).with_context(|| format!("Failed to read file: {:?}", path))?;
    let config: ConsoleConfig =
        serde_json::from_slice(&data).context("Failed to deserialize config")?;

    Ok(config)
}

/// Load configuration from `path`, falling back to defaults when it does not exist
pub fn load_config_or_default(path: &Path) -> Result<ConsoleConfig> {
    match fs::metadata(path) {
        Ok(_) => load_config(path),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("No config at {:?}, using defaults", path);
            Ok(ConsoleConfig::default())
        }
        Err(err) => Err(err).with_context(|| format!("Failed to stat config: {:?}", path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join(CONFIG_FILE);

        let config = ConsoleConfig {
            store_addr: Some("127.0.0.1:7000".to_string()),
            max_events: 10,
            ..ConsoleConfig::default()
        };

        write_config(&path, &config).unwrap();
        let loaded = load_config(&path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, br#"{"max_events": 5}"#).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.max_events, 5);
        assert_eq!(loaded.max_script_logs, 500);
        assert_eq!(loaded.event_source, "ws://127.0.0.1:12582/ws");
    }

    #[test]
    fn test_missing_config_is_default() {
        let temp = TempDir::new().unwrap();
        let loaded = load_config_or_default(&temp.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(loaded, ConsoleConfig::default());

        assert!(load_config(&temp.path().join(CONFIG_FILE)).is_err());
    }
}
