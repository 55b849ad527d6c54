//! Configuration: tuning knobs injected into the core, and the persisted
//! CLI settings file.
//!
//! The core components never read the environment or disk themselves; the
//! CLI resolves everything up front and passes it in.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NsqlError, Result};

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Number of tables to retrieve as generation context.
    pub top_k: usize,
    /// Additional generation attempts permitted after a rejection.
    pub retry_budget: usize,
    /// Generation timeouts retried before giving up; timeouts do not
    /// consume the rejection retry budget.
    pub max_timeout_retries: usize,
    pub generation_timeout: Duration,
    pub execution_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            retry_budget: 2,
            max_timeout_retries: 1,
            generation_timeout: Duration::from_secs(30),
            execution_timeout: Duration::from_secs(30),
        }
    }
}

/// Retriever signal weights. The two signals are combined as a weighted
/// sum; with no embedding backend only the lexical signal is used.
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    pub lexical_weight: f32,
    pub semantic_weight: f32,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            lexical_weight: 0.4,
            semantic_weight: 0.6,
        }
    }
}

/// Settings persisted by the CLI (`nsql config`), typically at
/// `~/.nsql/config.json`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub db_url: String,
    #[serde(default)]
    pub table_descriptions_file: String,
    #[serde(default)]
    pub model: String,
}

impl Settings {
    /// Load settings from `path`, falling back to defaults when the file
    /// does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| NsqlError::SchemaLoad(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| NsqlError::SchemaLoad(format!("Failed to parse {}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.top_k, 3);
        assert_eq!(config.retry_budget, 2);

        let weights = RetrieverConfig::default();
        assert!((weights.lexical_weight + weights.semantic_weight - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_settings_round_trip() {
        let dir = std::env::temp_dir().join("nsql_settings_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");

        let settings = Settings {
            db_url: "postgres://localhost/shop".to_string(),
            table_descriptions_file: "tables.json".to_string(),
            model: "gpt-4o-mini".to_string(),
        };
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.db_url, settings.db_url);
        assert_eq!(loaded.model, settings.model);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_settings_file_yields_defaults() {
        let path = std::env::temp_dir().join("nsql_settings_test_missing.json");
        let settings = Settings::load(&path).unwrap();
        assert!(settings.db_url.is_empty());
    }
}
