//! Text generation and embedding collaborators.
//!
//! The engine never talks to a model directly: tools call a [`Generator`].
//! [`OllamaClient`] speaks the Ollama REST API; [`OfflineGenerator`] is used
//! when no model is configured and fails every call, which the engine records
//! as an ordinary attempt failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

/// Errors from the generation subsystem.
#[derive(Debug, Error, Diagnostic)]
pub enum LlmError {
    #[error("language model is not available at {url}")]
    #[diagnostic(
        code(mindloop::llm::unavailable),
        help("Start Ollama with `ollama serve`, or set `[llm] enabled = false` to run without generation.")
    )]
    Unavailable { url: String },

    #[error("generation request failed: {message}")]
    #[diagnostic(
        code(mindloop::llm::request_failed),
        help("Check that Ollama is running and the model is pulled.")
    )]
    RequestFailed { message: String },

    #[error("failed to parse model response: {message}")]
    #[diagnostic(
        code(mindloop::llm::parse_error),
        help("The model returned an unexpected response format.")
    )]
    ParseError { message: String },

    #[error("model returned an empty embedding")]
    #[diagnostic(
        code(mindloop::llm::empty_embedding),
        help("Use an embedding-capable model, e.g. `nomic-embed-text`, via `[llm] embed_model`.")
    )]
    EmptyEmbedding,
}

pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// Generation and embedding, as seen by tools.
///
/// Calls may block; the engine runs tools on the blocking pool.
pub trait Generator: Send + Sync {
    /// Complete a prompt.
    fn generate(&self, prompt: &str) -> LlmResult<String>;

    /// Embed a text. An empty vector is never returned as success.
    fn embed(&self, text: &str) -> LlmResult<Vec<f32>>;
}

// ---------------------------------------------------------------------------
// Offline
// ---------------------------------------------------------------------------

/// Generator used when no model is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineGenerator;

impl Generator for OfflineGenerator {
    fn generate(&self, _prompt: &str) -> LlmResult<String> {
        Err(LlmError::Unavailable {
            url: "(offline)".into(),
        })
    }

    fn embed(&self, _text: &str) -> LlmResult<Vec<f32>> {
        Err(LlmError::Unavailable {
            url: "(offline)".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Ollama
// ---------------------------------------------------------------------------

/// Configuration for the Ollama client.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Base URL for the Ollama API.
    pub base_url: String,
    /// Model used for completions.
    pub model: String,
    /// Model used for embeddings.
    pub embed_model: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "llama3.2".into(),
            embed_model: "nomic-embed-text".into(),
            timeout_secs: 120,
        }
    }
}

/// Blocking client for the Ollama REST API.
pub struct OllamaClient {
    config: OllamaConfig,
    available: AtomicBool,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Self {
        Self {
            config,
            available: AtomicBool::new(false),
        }
    }

    /// Check that the server answers `/api/tags`.
    pub fn probe(&self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(5))
            .build();
        let ok = matches!(agent.get(&url).call(), Ok(resp) if resp.status() == 200);
        self.available.store(ok, Ordering::Relaxed);
        if !ok {
            tracing::warn!(url = %self.config.base_url, "ollama probe failed");
        }
        ok
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn post(&self, endpoint: &str, body: &serde_json::Value) -> LlmResult<serde_json::Value> {
        if !self.is_available() {
            return Err(LlmError::Unavailable {
                url: self.config.base_url.clone(),
            });
        }

        let url = format!("{}{endpoint}", self.config.base_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build();

        let body_str = serde_json::to_string(body).map_err(|e| LlmError::RequestFailed {
            message: format!("JSON serialize error: {e}"),
        })?;

        let resp = agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_string(&body_str)
            .map_err(|e: ureq::Error| LlmError::RequestFailed {
                message: e.to_string(),
            })?;

        let resp_str = resp.into_string().map_err(|e| LlmError::ParseError {
            message: e.to_string(),
        })?;

        serde_json::from_str(&resp_str).map_err(|e| LlmError::ParseError {
            message: e.to_string(),
        })
    }
}

impl Generator for OllamaClient {
    fn generate(&self, prompt: &str) -> LlmResult<String> {
        let body = serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "stream": false,
        });
        let json = self.post("/api/generate", &body)?;
        json["response"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| LlmError::ParseError {
                message: "missing 'response' field".into(),
            })
    }

    fn embed(&self, text: &str) -> LlmResult<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.config.embed_model,
            "prompt": text,
        });
        let json = self.post("/api/embeddings", &body)?;
        let embedding: Vec<f32> = json["embedding"]
            .as_array()
            .map(|arr| arr.iter().filter_map(|v| v.as_f64()).map(|v| v as f32).collect())
            .unwrap_or_default();
        if embedding.is_empty() {
            return Err(LlmError::EmptyEmbedding);
        }
        Ok(embedding)
    }
}

impl std::fmt::Debug for OllamaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaClient")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .field("available", &self.is_available())
            .finish()
    }
}
