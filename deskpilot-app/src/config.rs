use anyhow::{bail, Context, Result};
use deskpilot_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "deskpilot.yaml";
pub const ENDPOINT_ENV: &str = "DESKPILOT_ORACLE_ENDPOINT";
pub const MODEL_ENV: &str = "DESKPILOT_ORACLE_MODEL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    /// Base URL of an OpenAI-compatible API, e.g. `http://localhost:11434/v1`.
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "DESKPILOT_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    #[default]
    Hyprland,
    System,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub oracle: OracleSettings,
    pub snapshot: SnapshotSource,
    /// JSONL file receiving every execution record. Unset disables the journal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal_path: Option<PathBuf>,
}

impl AppConfig {
    /// Loads `path` (or `deskpilot.yaml`), falling back to defaults when the
    /// file does not exist, then applies environment overrides and validates.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = lookup(ENDPOINT_ENV).filter(|v| !v.trim().is_empty()) {
            self.oracle.endpoint = endpoint;
        }
        if let Some(model) = lookup(MODEL_ENV).filter(|v| !v.trim().is_empty()) {
            self.oracle.model = model;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.oracle.endpoint.trim().is_empty() {
            bail!("oracle.endpoint must not be empty");
        }
        if self.oracle.model.trim().is_empty() {
            bail!("oracle.model must not be empty");
        }
        self.engine.validate()?;
        Ok(())
    }

    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.oracle.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}
