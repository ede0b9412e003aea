use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// sqlite connection url, e.g. `sqlite://database/learnpath.db`
    pub database: String,
    /// Directory for daily rotated log files, stdout when unset
    pub log_dir: Option<PathBuf>,
    pub recalculation: RecalculationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: "sqlite://database/learnpath.db".to_string(),
            log_dir: None,
            recalculation: RecalculationConfig::default(),
        }
    }
}

/// Bounded retry policy for the optimistic snapshot update
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RecalculationConfig {
    pub max_attempts: u32,
    /// First retry delay, doubled on every further attempt
    pub backoff_ms: u64,
}

impl Default for RecalculationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_ms: 10,
        }
    }
}

impl Config {
    /// Load from a toml file if it exists, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("parse config {}", path.display()))?
        } else {
            Config::default()
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        let _ = dotenvy::dotenv();
        if let Ok(database) = dotenvy::var("LEARNPATH_DATABASE") {
            self.database = database;
        }
        if let Ok(log_dir) = dotenvy::var("LEARNPATH_LOG_DIR") {
            self.log_dir = Some(PathBuf::from(log_dir));
        }
    }
}
