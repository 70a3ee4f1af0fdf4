use super::defaults::{DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_WORKER_PORT};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Settings shared with the worker. Read at (re)start time only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    /// HTTP port the worker serves prompts (and `/shutdown`) on.
    pub port: u16,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub show_console: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_WORKER_PORT,
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            show_console: true,
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            bail!("port must be between 1 and 65535");
        }
        let base_url = self.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            bail!("baseUrl must start with http:// or https://, got '{}'", self.base_url);
        }
        if self.model.trim().is_empty() {
            bail!("model must not be empty");
        }
        Ok(())
    }
}

/// Where a [`ConfigStore::load`] result came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    /// No file existed; defaults were written.
    Created,
    /// The file could not be used; defaults are in effect and the file is untouched.
    Fallback(String),
}

/// JSON file holding a [`BridgeConfig`].
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the record, creating it with defaults on first run. Never fails: an
    /// unreadable or invalid file yields defaults plus a [`LoadOutcome::Fallback`].
    pub fn load(&self) -> (BridgeConfig, LoadOutcome) {
        if !self.path.exists() {
            let config = BridgeConfig::default();
            return match self.save(&config) {
                Ok(()) => (config, LoadOutcome::Created),
                Err(err) => (config, LoadOutcome::Fallback(format!("{err:#}"))),
            };
        }

        match self.read() {
            Ok(config) => (config, LoadOutcome::Loaded),
            Err(err) => (BridgeConfig::default(), LoadOutcome::Fallback(format!("{err:#}"))),
        }
    }

    fn read(&self) -> Result<BridgeConfig> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let config: BridgeConfig = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid settings in {}", self.path.display()))?;
        Ok(config)
    }

    pub fn save(&self, config: &BridgeConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(config).context("failed to encode settings")?;
        fs::write(&self.path, json)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}
