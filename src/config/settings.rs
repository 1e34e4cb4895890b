//! Configuration settings for the weft engine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub promotion: PromotionSettings,
    pub candidate: CandidateSettings,
    pub budgeter: BudgeterSettings,
    pub storage: StorageSettings,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::ReadFile)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations or use defaults.
    pub fn load() -> Result<Self> {
        let config_paths = [
            // Current directory
            PathBuf::from("weft.toml"),
            PathBuf::from("config.toml"),
            // User config directory
            dirs::config_dir()
                .map(|p| p.join("weft/config.toml"))
                .unwrap_or_default(),
            // Home directory
            dirs::home_dir()
                .map(|p| p.join(".weft/config.toml"))
                .unwrap_or_default(),
        ];

        for path in &config_paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.promotion.appearance_threshold == 0 {
            return Err(ConfigError::Invalid(
                "promotion.appearance_threshold must be >= 1".to_string(),
            )
            .into());
        }
        if !(0.0..=1.0).contains(&self.promotion.score_threshold) {
            return Err(ConfigError::Invalid(
                "promotion.score_threshold must be between 0 and 1".to_string(),
            )
            .into());
        }
        if !(0.0..=1.0).contains(&self.promotion.merge_similarity_threshold) {
            return Err(ConfigError::Invalid(
                "promotion.merge_similarity_threshold must be between 0 and 1".to_string(),
            )
            .into());
        }
        if self.candidate.stale_window_secs == 0 {
            return Err(ConfigError::Invalid(
                "candidate.stale_window_secs must be > 0".to_string(),
            )
            .into());
        }
        if self.budgeter.chars_per_token < 1.0 {
            return Err(ConfigError::Invalid(
                "budgeter.chars_per_token must be >= 1.0".to_string(),
            )
            .into());
        }
        if (self.storage.persist_graph || self.storage.persist_snapshots)
            && self.storage.data_dir.is_empty()
        {
            return Err(ConfigError::MissingField("storage.data_dir".to_string()).into());
        }
        Ok(())
    }

    /// Expand the data directory path.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let expanded = shellexpand::tilde(&self.storage.data_dir);
        Ok(PathBuf::from(expanded.as_ref()))
    }
}

/// Promotion thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionSettings {
    /// Appearances at which a candidate is promoted.
    pub appearance_threshold: u32,
    /// Promotion score at which a candidate is promoted (0-1).
    pub score_threshold: f64,
    /// Similarity at or above which hits fold into existing records (0-1).
    pub merge_similarity_threshold: f64,
}

impl Default for PromotionSettings {
    fn default() -> Self {
        Self {
            appearance_threshold: 3,
            score_threshold: 0.8,
            merge_similarity_threshold: 0.85,
        }
    }
}

/// Candidate lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateSettings {
    /// Pending candidates unreinforced for this long are retired as stale.
    pub stale_window_secs: u64,
}

impl Default for CandidateSettings {
    fn default() -> Self {
        Self {
            // 14 days.
            stale_window_secs: 1_209_600,
        }
    }
}

impl CandidateSettings {
    /// The stale window as a duration.
    pub fn stale_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_window_secs as i64)
    }
}

/// Token budgeter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgeterSettings {
    /// Characters-per-token ratio used by the estimator.
    pub chars_per_token: f64,
}

impl Default for BudgeterSettings {
    fn default() -> Self {
        Self {
            chars_per_token: 4.0,
        }
    }
}

/// Storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Base directory for persisted state.
    pub data_dir: String,
    /// Persist the graph to disk.
    pub persist_graph: bool,
    /// Persist snapshots to disk.
    pub persist_snapshots: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.local/share/weft".to_string(),
            persist_graph: false,
            persist_snapshots: false,
        }
    }
}
