//! Runtime settings
//!
//! Loaded from `~/.listwise/config.toml` when present, then overridden by
//! `LISTWISE_*` environment variables. Every field has a default so a missing
//! file is not an error.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::paths;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BULK_CONCURRENCY: usize = 3;
pub const DEFAULT_MANAGER_MAX_STEPS: usize = 12;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_path: PathBuf,
    pub server: ServerSettings,
    pub model: ModelSettings,
    pub agents: AgentSettings,
    pub services: ServiceSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,
}

/// Provider settings for the two model tiers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Cheap tier: vision, editing, classification.
    pub fast_model: String,
    /// Quality tier: orchestration and bilingual copy.
    pub quality_model: String,
    pub max_tokens: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub manager_max_steps: usize,
    pub bulk_concurrency: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Image grouping service endpoint. Without one, grouping falls back to
    /// filename stems.
    pub grouping_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: paths::default_db_path(),
            server: ServerSettings::default(),
            model: ModelSettings::default(),
            agents: AgentSettings::default(),
            services: ServiceSettings::default(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com/v1/messages".to_string(),
            api_key: None,
            fast_model: "claude-haiku-4-5".to_string(),
            quality_model: "claude-sonnet-4-5".to_string(),
            max_tokens: 4096,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            manager_max_steps: DEFAULT_MANAGER_MAX_STEPS,
            bulk_concurrency: DEFAULT_BULK_CONCURRENCY,
        }
    }
}

impl Settings {
    /// Load from the default config file and apply environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file())
    }

    /// Load from a specific file (missing file means defaults) and apply
    /// environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut settings = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Self::from_toml(&raw)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Self::default()
        };
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply overrides from an environment lookup. Split out so tests don't
    /// have to mutate the process environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("LISTWISE_DB_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(port) = lookup("LISTWISE_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(key) = lookup("LISTWISE_API_KEY").or_else(|| lookup("ANTHROPIC_API_KEY")) {
            self.model.api_key = Some(key);
        }
        if let Some(url) = lookup("LISTWISE_BASE_URL") {
            self.model.base_url = url;
        }
        if let Some(model) = lookup("LISTWISE_FAST_MODEL") {
            self.model.fast_model = model;
        }
        if let Some(model) = lookup("LISTWISE_QUALITY_MODEL") {
            self.model.quality_model = model;
        }
        if let Some(url) = lookup("LISTWISE_GROUPING_URL") {
            self.services.grouping_url = Some(url);
        }
        if let Some(width) = lookup("LISTWISE_BULK_CONCURRENCY").and_then(|w| w.parse().ok()) {
            self.agents.bulk_concurrency = width;
        }
        // A zero-width fan-out would never make progress
        self.agents.bulk_concurrency = self.agents.bulk_concurrency.max(1);
    }
}
