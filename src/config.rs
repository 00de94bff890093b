//! Configuration file: `$XDG_CONFIG_HOME/mindloop/config.toml`.
//!
//! ```toml
//! [engine]
//! max_concurrent = 4
//! batch_size = 4
//! max_retries = 3
//! tool_timeout_ms = 60000
//! tick_ms = 1000
//! # seed = 42
//!
//! [llm]
//! enabled = true
//! base_url = "http://localhost:11434"
//! model = "llama3.2"
//! embed_model = "nomic-embed-text"
//! timeout_secs = 120
//!
//! [persist]
//! interval_ms = 2000
//! bootstrap = true
//! ```
//!
//! Every key is optional.

use std::path::Path;
use std::time::Duration;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::EngineConfig;
use crate::llm::OllamaConfig;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(mindloop::config::read),
        help("Ensure the config file exists, or run `mindloop init` to create one.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}: {message}")]
    #[diagnostic(
        code(mindloop::config::parse),
        help("Check the TOML syntax in the config file.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(mindloop::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MindConfig {
    pub engine: EngineSection,
    pub llm: LlmSection,
    pub persist: PersistSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub max_concurrent: usize,
    pub batch_size: usize,
    pub max_retries: u32,
    pub tool_timeout_ms: u64,
    /// Daemon scheduling interval.
    pub tick_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for EngineSection {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            max_concurrent: engine.max_concurrent,
            batch_size: engine.batch_size,
            max_retries: engine.max_retries,
            tool_timeout_ms: engine.tool_timeout.as_millis() as u64,
            tick_ms: 1000,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// When false, generation and embedding always fail.
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub embed_model: String,
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        let ollama = OllamaConfig::default();
        Self {
            enabled: true,
            base_url: ollama.base_url,
            model: ollama.model,
            embed_model: ollama.embed_model,
            timeout_secs: ollama.timeout_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistSection {
    /// Minimum spacing of background saves.
    pub interval_ms: u64,
    /// Load the bundled rule pack when the state has no rules.
    pub bootstrap: bool,
}

impl Default for PersistSection {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            bootstrap: true,
        }
    }
}

impl MindConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&content).map_err(|message| ConfigError::Parse {
            path: path.display().to_string(),
            message,
        })
    }

    /// Load from a TOML file, or defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_concurrent: self.engine.max_concurrent,
            batch_size: self.engine.batch_size,
            max_retries: self.engine.max_retries,
            tool_timeout: Duration::from_millis(self.engine.tool_timeout_ms),
            seed: self.engine.seed,
        }
    }

    pub fn ollama_config(&self) -> OllamaConfig {
        OllamaConfig {
            base_url: self.llm.base_url.clone(),
            model: self.llm.model.clone(),
            embed_model: self.llm.embed_model.clone(),
            timeout_secs: self.llm.timeout_secs,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.engine.tick_ms.max(1))
    }

    pub fn persist_interval(&self) -> Duration {
        Duration::from_millis(self.persist.interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(MindConfig::parse("").unwrap(), MindConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = MindConfig::parse("[engine]\nmax_retries = 5\nseed = 9\n").unwrap();
        assert_eq!(cfg.engine.max_retries, 5);
        assert_eq!(cfg.engine.batch_size, 4);
        assert_eq!(cfg.engine_config().seed, Some(9));
        assert!(cfg.llm.enabled);
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(MindConfig::parse("[engine\n").is_err());
    }

    #[test]
    fn config_roundtrip_toml() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested/config.toml");

        let mut cfg = MindConfig::default();
        cfg.llm.model = "mistral".into();
        cfg.persist.bootstrap = false;
        cfg.save(&path).unwrap();

        assert_eq!(MindConfig::load(&path).unwrap(), cfg);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = MindConfig::load_or_default(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, MindConfig::default());
        assert!(MindConfig::load(&tmp.path().join("absent.toml")).is_err());
    }
}
