//! Backend factory and registry.
//!
//! Each screening stage names the backend it uses ("openai", "anthropic",
//! ...). The registry maps those names to constructed backends so both
//! stages can share a client when they point at the same provider.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use secrecy::SecretString;
use serde::Deserialize;

use crate::backend::{
    AnthropicBackend, GeminiBackend, LlmBackend, LlmError, OpenAiBackend, OpenAiCompatibleBackend,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Openai,
    Anthropic,
    Gemini,
    OpenaiCompatible,
    Ollama,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Openai           => "openai",
            BackendKind::Anthropic        => "anthropic",
            BackendKind::Gemini           => "gemini",
            BackendKind::OpenaiCompatible => "openai_compatible",
            BackendKind::Ollama           => "ollama",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            BackendKind::Openai           => "gpt-3.5-turbo",
            BackendKind::Anthropic        => "claude-3-5-sonnet-latest",
            BackendKind::Gemini           => "gemini-1.5-flash",
            BackendKind::OpenaiCompatible => "local-model",
            BackendKind::Ollama           => "llama3.1:8b",
        }
    }
}

/// Settings for one named backend. Not `Clone`: it carries the API key.
#[derive(Debug)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    /// Override the context window reported for OpenAI-compatible servers.
    pub context_tokens: Option<usize>,
}

impl BackendConfig {
    pub fn new(kind: BackendKind) -> Self {
        Self { kind, model: None, base_url: None, api_key: None, context_tokens: None }
    }
}

/// Construct a backend. A remote provider without a key is a configuration
/// error reported before any document is screened.
pub fn build_backend(name: &str, cfg: BackendConfig) -> Result<Arc<dyn LlmBackend>, LlmError> {
    let model = cfg.model.unwrap_or_else(|| cfg.kind.default_model().to_string());

    let backend: Arc<dyn LlmBackend> = match (cfg.kind, cfg.api_key) {
        (BackendKind::Openai, Some(key)) => Arc::new(OpenAiBackend::new(key, model)),
        (BackendKind::Anthropic, Some(key)) => Arc::new(AnthropicBackend::new(key, model)),
        (BackendKind::Gemini, Some(key)) => Arc::new(GeminiBackend::new(key, model)),
        (BackendKind::Openai | BackendKind::Anthropic | BackendKind::Gemini, None) => {
            return Err(LlmError::Unavailable(format!(
                "backend '{name}' ({}) has no API key configured",
                cfg.kind.as_str()
            )))
        }
        (BackendKind::OpenaiCompatible, api_key) => {
            let base_url = cfg.base_url.ok_or_else(|| {
                LlmError::Unavailable(format!("backend '{name}' needs a base_url"))
            })?;
            let mut b = OpenAiCompatibleBackend::new(base_url, model, api_key);
            if let Some(tokens) = cfg.context_tokens {
                b = b.with_context_tokens(tokens);
            }
            Arc::new(b)
        }
        (BackendKind::Ollama, _) => {
            let base_url = cfg.base_url.unwrap_or_else(|| "http://localhost:11434".to_string());
            let mut b = OpenAiCompatibleBackend::ollama(base_url, model);
            if let Some(tokens) = cfg.context_tokens {
                b = b.with_context_tokens(tokens);
            }
            Arc::new(b)
        }
    };

    tracing::info!(
        backend = name,
        kind = cfg.kind.as_str(),
        model = backend.model_id(),
        is_local = backend.is_local(),
        "LLM backend configured"
    );
    Ok(backend)
}

/// Named backends available to the screening stages.
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn LlmBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, backend: Arc<dyn LlmBackend>) {
        self.backends.insert(name.into(), backend);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn LlmBackend>, LlmError> {
        self.backends.get(name).cloned().ok_or_else(|| {
            LlmError::Unavailable(format!(
                "backend '{name}' is not configured (available: {})",
                self.registered_backends().join(", ")
            ))
        })
    }

    /// Registered names, sorted.
    pub fn registered_backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Build every configured backend. A backend that cannot be built is left
/// out with a warning; it only matters once a stage asks for it by name.
pub fn build_registry(configs: BTreeMap<String, BackendConfig>) -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    for (name, cfg) in configs {
        match build_backend(&name, cfg) {
            Ok(backend) => registry.register(name, backend),
            Err(e) => tracing::warn!(backend = %name, error = %e, "Backend skipped"),
        }
    }
    registry
}
