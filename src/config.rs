//! Configuration management
//!
//! Loads tutor settings from a TOML file in the platform config directory,
//! falling back to defaults when no file exists. Also hosts the factory
//! helpers that turn configuration into live store and strategy instances.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::store::{MemoryStateStore, SqliteStateStore, StateStore};
use crate::strategy::{AccuracyBasedStrategy, DifficultyStrategy};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TutorConfig {
    /// Session state persistence settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Difficulty strategy selection
    #[serde(default)]
    pub strategy: StrategyConfig,
}

/// Where and how session state is persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend: "sqlite" or "memory"
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Database file path; defaults to the platform data directory
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

fn default_backend() -> String {
    "sqlite".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            database_path: None,
        }
    }
}

/// Which difficulty strategy drives exercise selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Strategy name; "accuracy_based" is the only built-in
    #[serde(default = "default_strategy")]
    pub kind: String,
}

fn default_strategy() -> String {
    "accuracy_based".to_string()
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            kind: default_strategy(),
        }
    }
}

impl TutorConfig {
    /// Load configuration from file, creating it with defaults if absent
    pub fn load() -> Result<Self> {
        let config_path = config_path()?;

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            let config: TutorConfig =
                toml::from_str(&contents).context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = TutorConfig::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = config_path()?;
        let parent = config_path
            .parent()
            .context("Config path has no parent")?;

        std::fs::create_dir_all(parent).context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Build the configured state store
    pub async fn build_store(&self) -> Result<Arc<dyn StateStore>> {
        match self.storage.backend.as_str() {
            "memory" => Ok(Arc::new(MemoryStateStore::new())),
            "sqlite" => {
                let path = match &self.storage.database_path {
                    Some(path) => path.clone(),
                    None => data_dir()?.join("sessions.db"),
                };
                let store = SqliteStateStore::new(&path)
                    .await
                    .with_context(|| format!("Failed to open session store at {}", path.display()))?;
                Ok(Arc::new(store))
            }
            other => anyhow::bail!("Unknown storage backend '{other}' (expected sqlite or memory)"),
        }
    }

    /// Build the configured difficulty strategy
    pub fn build_strategy(&self) -> Result<Arc<dyn DifficultyStrategy>> {
        match self.strategy.kind.as_str() {
            "accuracy_based" => Ok(Arc::new(AccuracyBasedStrategy)),
            other => anyhow::bail!("Unknown difficulty strategy '{other}'"),
        }
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "tutor-core", "tutor-core")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "tutor-core", "tutor-core")
        .context("Failed to get project directories")?;
    Ok(base.data_dir().to_path_buf())
}
