//! Process configuration, read from `GATESCHED_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::engine::EngineConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub store_timeout: Duration,
    /// WAL appends since the last compaction that trigger the next one.
    pub compact_threshold: u64,
    pub system_user: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            store_timeout: Duration::from_millis(5000),
            compact_threshold: 1000,
            system_user: "system".into(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset or unparsable values fall back to the default.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());

        Self {
            data_dir: lookup("GATESCHED_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            metrics_port: lookup("GATESCHED_METRICS_PORT").and_then(|s| s.trim().parse().ok()),
            store_timeout: parsed("GATESCHED_STORE_TIMEOUT_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.store_timeout),
            compact_threshold: parsed("GATESCHED_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            system_user: lookup("GATESCHED_SYSTEM_USER")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.system_user),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            store_timeout: self.store_timeout,
            system_user: self.system_user.clone(),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("assignments.wal")
    }
}
