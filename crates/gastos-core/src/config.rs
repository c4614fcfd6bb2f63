//! Configuration
//!
//! Settings come from `<data_dir>/config.toml`, then environment variables,
//! then CLI flags (applied by the caller).
//!
//! ```toml
//! endpoint = "https://script.google.com/macros/s/.../exec"
//!
//! [extractor]
//! backend = "ollama"
//! host = "http://localhost:11434"
//! model = "llama3.2"
//! vision_model = "llava"
//! ```
//!
//! Environment variables:
//! - `GASTOS_DATA_DIR`: data directory (default: platform data dir + `gastos`)
//! - `GASTOS_SHEETS_URL`: spreadsheet bridge endpoint
//! - `GASTOS_EXTRACTOR`: extractor backend (ollama, mock)
//! - `OLLAMA_HOST`, `OLLAMA_MODEL`, `OLLAMA_VISION_MODEL`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::Result;

pub const CONFIG_FILE: &str = "config.toml";

/// Extraction backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub model: String,
    pub vision_model: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            backend: "ollama".to_string(),
            host: None,
            model: "llama3.2".to_string(),
            vision_model: "llava".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the snapshot and config file live
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Spreadsheet bridge URL; unset means local-only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub extractor: ExtractorConfig,
}

impl Config {
    /// Platform data directory, e.g. `~/.local/share/gastos`
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gastos")
    }

    /// Load from the data directory and the process environment
    pub fn load(data_dir: Option<&Path>) -> Result<Self> {
        let data_dir = data_dir
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("GASTOS_DATA_DIR").ok().map(PathBuf::from))
            .unwrap_or_else(Self::default_data_dir);
        let mut config = Self::from_file(&data_dir)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load only the config file (defaults when it doesn't exist)
    pub fn from_file(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        let mut config: Config = match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(e.into()),
        };
        config.data_dir = data_dir.to_path_buf();
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(endpoint) = non_empty("GASTOS_SHEETS_URL") {
            self.endpoint = Some(endpoint);
        }
        if let Some(backend) = non_empty("GASTOS_EXTRACTOR") {
            self.extractor.backend = backend;
        }
        if let Some(host) = non_empty("OLLAMA_HOST") {
            self.extractor.host = Some(host);
        }
        if let Some(model) = non_empty("OLLAMA_MODEL") {
            self.extractor.model = model;
        }
        if let Some(model) = non_empty("OLLAMA_VISION_MODEL") {
            self.extractor.vision_model = model;
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE)
    }

    /// Write the config file, creating the data directory if needed
    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        let contents = toml::to_string_pretty(self)?;
        let mut tmp = NamedTempFile::new_in(&self.data_dir)?;
        std::io::Write::write_all(&mut tmp, contents.as_bytes())?;
        tmp.persist(self.config_path()).map_err(|e| e.error)?;
        Ok(())
    }
}
