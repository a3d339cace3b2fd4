//! Configuration loading for litscreen.
//! Reads litscreen.toml: LLM provider settings under `[llm]`, screening
//! settings (keywords, corpus, stages, retry, execution, ledger) at the top level.

use std::collections::BTreeMap;
use std::path::Path;

use litscreen_common::ScreeningConfig;
use litscreen_llm::{BackendConfig, BackendKind};
use secrecy::SecretString;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(flatten)]
    pub screening: ScreeningConfig,
}

/// Provider sections. Only the configured ones are built.
#[derive(Debug, Default, Deserialize)]
pub struct LlmConfig {
    pub openai: Option<ProviderConfig>,
    pub anthropic: Option<ProviderConfig>,
    pub gemini: Option<ProviderConfig>,
    pub openai_compatible: Option<ProviderConfig>,
    pub ollama: Option<ProviderConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProviderConfig {
    /// Empty or absent: read from `LITSCREEN_<PROVIDER>_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub context_tokens: Option<usize>,
}

mod tests;

impl Config {
    /// Load and validate configuration from `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            anyhow::bail!(
                "Config file not found: {}\n\
                 Copy litscreen.example.toml to litscreen.toml and edit it.",
                path.display()
            );
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.screening.validate()?;
        Ok(config)
    }

    /// Backend settings for every configured provider, keyed by the name the
    /// stage sections refer to. Remote providers without a key are left out
    /// with a warning so that commands not calling an LLM still run.
    pub fn backend_configs(&self) -> BTreeMap<String, BackendConfig> {
        self.backend_configs_with(|var| std::env::var(var).ok())
    }

    fn backend_configs_with(&self, env: impl Fn(&str) -> Option<String>) -> BTreeMap<String, BackendConfig> {
        let providers = [
            (BackendKind::Openai, &self.llm.openai),
            (BackendKind::Anthropic, &self.llm.anthropic),
            (BackendKind::Gemini, &self.llm.gemini),
            (BackendKind::OpenaiCompatible, &self.llm.openai_compatible),
            (BackendKind::Ollama, &self.llm.ollama),
        ];

        let mut configs = BTreeMap::new();
        for (kind, provider) in providers {
            let Some(provider) = provider else { continue };
            let name = kind.as_str();
            let env_var = format!("LITSCREEN_{}_API_KEY", name.to_uppercase());

            let key = provider
                .api_key
                .clone()
                .filter(|k| !k.trim().is_empty())
                .or_else(|| env(&env_var).filter(|k| !k.trim().is_empty()));

            let needs_key = matches!(kind, BackendKind::Openai | BackendKind::Anthropic | BackendKind::Gemini);
            if needs_key && key.is_none() {
                tracing::warn!(
                    "{name} configured but no API key found (set llm.{name}.api_key or {env_var})"
                );
                continue;
            }

            configs.insert(
                name.to_string(),
                BackendConfig {
                    kind,
                    model: provider.model.clone(),
                    base_url: provider.base_url.clone(),
                    api_key: key.map(SecretString::from),
                    context_tokens: provider.context_tokens,
                },
            );
        }

        if configs.is_empty() {
            tracing::warn!(
                "No LLM backends configured! Add at least one provider to litscreen.toml. \
                 Screening stages will be unavailable."
            );
        }
        configs
    }
}
