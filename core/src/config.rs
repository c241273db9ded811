use crate::{
    error::{TargetError, TargetResult},
    types::Year,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_db_path() -> String {
    ":memory:".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_min_year() -> Year {
    2000
}

fn default_max_year() -> Year {
    2100
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// SQLite database path, or ":memory:".
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// How long a writer waits for a concurrent writer's transaction.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Accepted `year` window, inclusive.
    #[serde(default = "default_min_year")]
    pub min_year: Year,
    #[serde(default = "default_max_year")]
    pub max_year: Year,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            min_year: default_min_year(),
            max_year: default_max_year(),
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file. Missing keys take their defaults.
    /// In tests, use EngineConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: EngineConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        if config.min_year > config.max_year {
            anyhow::bail!(
                "{path}: min_year {} is after max_year {}",
                config.min_year,
                config.max_year
            );
        }
        Ok(config)
    }

    pub fn default_test() -> Self {
        Self {
            busy_timeout_ms: 1_000,
            ..Self::default()
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn check_year(&self, year: Year) -> TargetResult<Year> {
        if (self.min_year..=self.max_year).contains(&year) {
            Ok(year)
        } else {
            Err(TargetError::validation(format!(
                "year {year} is outside {}..={}",
                self.min_year, self.max_year
            )))
        }
    }
}
