//! LLM backend trait and concrete implementations.
//!
//! Backends:
//!   OpenAiBackend           - OpenAI chat completions (gpt-3.5-turbo, gpt-4, …)
//!   OpenAiCompatibleBackend - any OpenAI-compatible endpoint (Ollama, vLLM,
//!                             LMStudio, Groq, OpenRouter, …)
//!   AnthropicBackend        - Anthropic Messages API (claude-*)
//!   GeminiBackend           - Google Gemini API (gemini-1.5-pro, flash, …)

use async_trait::async_trait;
use litscreen_common::Transient;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Rate limit exceeded")]
    RateLimitExceeded,
    #[error("API error [{status}]: {message}")]
    ApiError { status: u16, message: String },
    #[error("Request timed out after {0}s")]
    Timeout(u64),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl Transient for LlmError {
    /// Transport failures, timeouts, 429 and 5xx may clear up on a later
    /// attempt. Other 4xx and unparseable replies will not.
    fn is_transient(&self) -> bool {
        match self {
            LlmError::Http(_) | LlmError::RateLimitExceeded | LlmError::Timeout(_) => true,
            LlmError::ApiError { status, .. } => *status == 408 || *status >= 500,
            LlmError::Serde(_) | LlmError::Unavailable(_) | LlmError::InvalidResponse(_) => false,
        }
    }
}

// ── Request / Response ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,   // "system" | "user" | "assistant"
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

// ── Trait ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError>;
    fn model_id(&self) -> &str;
    fn is_local(&self) -> bool;
    fn max_context_tokens(&self) -> usize;
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn parse_openai_response(json: &serde_json::Value, fallback_model: &str) -> Result<LlmResponse, LlmError> {
    let content = json["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| LlmError::InvalidResponse("no choices[0].message.content".to_string()))?;
    Ok(LlmResponse {
        content: content.to_string(),
        model: json["model"].as_str().unwrap_or(fallback_model).to_string(),
        prompt_tokens:     json["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        completion_tokens: json["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    })
}

async fn check_response_status(resp: reqwest::Response) -> Result<serde_json::Value, LlmError> {
    let status = resp.status().as_u16();
    let text = resp.text().await?;
    if status == 429 {
        return Err(LlmError::RateLimitExceeded);
    }
    if status >= 400 {
        let body: serde_json::Value = serde_json::from_str(&text).unwrap_or_default();
        let msg = body["error"]["message"]
            .as_str()
            .or_else(|| body["message"].as_str())
            .map(str::to_string)
            .unwrap_or_else(|| truncate(&text, 200));
        return Err(LlmError::ApiError { status, message: msg });
    }
    serde_json::from_str(&text)
        .map_err(|e| LlmError::InvalidResponse(format!("body is not JSON: {e}")))
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

fn chat_body(req: &LlmRequest, default_model: &str) -> serde_json::Value {
    serde_json::json!({
        "model":       req.model.as_deref().unwrap_or(default_model),
        "messages":    req.messages,
        "max_tokens":  req.max_tokens.unwrap_or(1024),
        "temperature": req.temperature.unwrap_or(0.0),
    })
}

// ── 1. OpenAI ─────────────────────────────────────────────────────────────────

pub struct OpenAiBackend {
    pub model: String,
    api_key: SecretString,
    client: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Self {
        Self { model: model.into(), api_key, client: reqwest::Client::new() }
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let body = chat_body(&req, &self.model);
        let resp = self.client
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;
        let json = check_response_status(resp).await?;
        parse_openai_response(&json, &self.model)
    }

    fn model_id(&self) -> &str { &self.model }
    fn is_local(&self) -> bool { false }
    fn max_context_tokens(&self) -> usize {
        if self.model.starts_with("gpt-3.5") { 16_385 } else { 128_000 }
    }
}

// ── 2. OpenAI-Compatible (Ollama, vLLM, LMStudio, Groq, OpenRouter, …) ──────

pub struct OpenAiCompatibleBackend {
    pub base_url: String,
    pub model: String,
    api_key: Option<SecretString>,
    local: bool,
    context_tokens: usize,
    client: reqwest::Client,
}

impl OpenAiCompatibleBackend {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<SecretString>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key,
            local: false,
            context_tokens: 128_000,
            client: reqwest::Client::new(),
        }
    }

    /// Local Ollama server through its OpenAI-compatible endpoint.
    pub fn ollama(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self { local: true, context_tokens: 32_768, ..Self::new(base_url, model, None) }
    }

    pub fn with_context_tokens(mut self, tokens: usize) -> Self {
        self.context_tokens = tokens;
        self
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(k) => req.bearer_auth(k.expose_secret()),
            None    => req,
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatibleBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let body = chat_body(&req, &self.model);
        let resp = self.auth(self.client.post(&url)).json(&body).send().await?;
        let json = check_response_status(resp).await?;
        parse_openai_response(&json, &self.model)
    }

    fn model_id(&self) -> &str { &self.model }
    fn is_local(&self) -> bool { self.local }
    fn max_context_tokens(&self) -> usize { self.context_tokens }
}

// ── 3. Anthropic (claude-*) ───────────────────────────────────────────────────

pub struct AnthropicBackend {
    pub model: String,
    api_key: SecretString,
    client: reqwest::Client,
}

impl AnthropicBackend {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Self {
        Self { api_key, model: model.into(), client: reqwest::Client::new() }
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        // Messages API takes the system prompt separately
        let system = req.messages.iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .unwrap_or("");

        let messages: Vec<serde_json::Value> = req.messages.iter()
            .filter(|m| m.role != "system")
            .map(|m| serde_json::json!({"role": m.role, "content": m.content}))
            .collect();

        let model = req.model.as_deref().unwrap_or(&self.model);
        let mut body = serde_json::json!({
            "model":       model,
            "messages":    messages,
            "max_tokens":  req.max_tokens.unwrap_or(1024),
            "temperature": req.temperature.unwrap_or(0.0),
        });
        if !system.is_empty() {
            body["system"] = serde_json::Value::String(system.to_string());
        }

        let resp = self.client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let json = check_response_status(resp).await?;

        let content = json["content"]
            .as_array()
            .and_then(|blocks| blocks.iter().find_map(|b| b["text"].as_str()))
            .ok_or_else(|| LlmError::InvalidResponse("no text block in content".to_string()))?
            .to_string();

        Ok(LlmResponse {
            content,
            model: json["model"].as_str().unwrap_or(model).to_string(),
            prompt_tokens:     json["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: json["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32,
        })
    }

    fn model_id(&self) -> &str { &self.model }
    fn is_local(&self) -> bool { false }
    fn max_context_tokens(&self) -> usize { 200_000 }
}

// ── 4. Google Gemini ──────────────────────────────────────────────────────────

pub struct GeminiBackend {
    pub model: String,
    api_key: SecretString,
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Self {
        Self { api_key, model: model.into(), client: reqwest::Client::new() }
    }
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let model = req.model.as_deref().unwrap_or(&self.model);
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent"
        );

        let system_text = req.messages.iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.clone());

        let contents: Vec<serde_json::Value> = req.messages.iter()
            .filter(|m| m.role != "system")
            .map(|m| {
                let role = if m.role == "assistant" { "model" } else { "user" };
                serde_json::json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();

        let mut body = serde_json::json!({
            "contents": contents,
            "generationConfig": {
                "maxOutputTokens": req.max_tokens.unwrap_or(1024),
                "temperature":     req.temperature.unwrap_or(0.0),
            }
        });
        if let Some(sys) = system_text {
            body["systemInstruction"] = serde_json::json!({ "parts": [{ "text": sys }] });
        }

        // Key goes in a header so it never appears in error URLs
        let resp = self.client
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;
        let json = check_response_status(resp).await?;

        let content = json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| LlmError::InvalidResponse("no candidate text".to_string()))?
            .to_string();

        Ok(LlmResponse {
            content,
            model: model.to_string(),
            prompt_tokens:     json["usageMetadata"]["promptTokenCount"].as_u64().unwrap_or(0) as u32,
            completion_tokens: json["usageMetadata"]["candidatesTokenCount"].as_u64().unwrap_or(0) as u32,
        })
    }

    fn model_id(&self) -> &str { &self.model }
    fn is_local(&self) -> bool { false }
    fn max_context_tokens(&self) -> usize { 1_000_000 }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn test_openai_backend_is_not_local() {
        let b = OpenAiBackend::new(key("sk-test"), "gpt-3.5-turbo");
        assert!(!b.is_local());
        assert_eq!(b.model_id(), "gpt-3.5-turbo");
        assert_eq!(b.max_context_tokens(), 16_385);
        assert_eq!(OpenAiBackend::new(key("sk-test"), "gpt-4").max_context_tokens(), 128_000);
    }

    #[test]
    fn test_anthropic_backend_is_not_local() {
        let b = AnthropicBackend::new(key("sk-ant-test"), "claude-3-5-sonnet-latest");
        assert!(!b.is_local());
        assert_eq!(b.model_id(), "claude-3-5-sonnet-latest");
    }

    #[test]
    fn test_gemini_context_window() {
        let b = GeminiBackend::new(key("AIza-test"), "gemini-1.5-pro");
        assert_eq!(b.max_context_tokens(), 1_000_000);
    }

    #[test]
    fn test_ollama_is_local_and_keyless() {
        let b = OpenAiCompatibleBackend::ollama("http://localhost:11434", "llama3:8b");
        assert!(b.is_local());
        assert!(b.api_key.is_none());
        assert_eq!(b.max_context_tokens(), 32_768);
    }

    #[test]
    fn test_transient_classification() {
        assert!(LlmError::RateLimitExceeded.is_transient());
        assert!(LlmError::Timeout(30).is_transient());
        assert!(LlmError::ApiError { status: 503, message: "overloaded".into() }.is_transient());
        assert!(!LlmError::ApiError { status: 401, message: "bad key".into() }.is_transient());
        assert!(!LlmError::InvalidResponse("prose".into()).is_transient());
    }

    #[test]
    fn test_parse_openai_response() {
        let json = serde_json::json!({
            "model": "gpt-4-0613",
            "choices": [{ "message": { "role": "assistant", "content": "{\"claims\": []}" } }],
            "usage": { "prompt_tokens": 812, "completion_tokens": 7 }
        });
        let r = parse_openai_response(&json, "gpt-4").unwrap();
        assert_eq!(r.model, "gpt-4-0613");
        assert_eq!(r.prompt_tokens, 812);

        let empty = serde_json::json!({ "choices": [] });
        assert!(matches!(parse_openai_response(&empty, "gpt-4"), Err(LlmError::InvalidResponse(_))));
    }
}
