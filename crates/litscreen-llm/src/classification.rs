//! Claim classification on top of an LLM backend.
//!
//! The model receives the stage prompt as the system message and the
//! document text as the user message, and must answer with
//! `{"claims": ["...", ...]}`. A non-empty list is a positive verdict.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::backend::{LlmBackend, LlmError, LlmRequest, Message};

/// Parsed answer for one piece of text.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub claims: Vec<String>,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub latency_ms: u64,
    pub raw_output: String,
}

impl Classification {
    pub fn verdict(&self) -> bool {
        !self.claims.is_empty()
    }
}

/// Decides whether a text makes the target claim.
#[async_trait]
pub trait ClaimClassifier: Send + Sync {
    async fn classify(&self, text: &str, prompt: &str) -> Result<Classification, LlmError>;

    /// Model recorded on verdicts produced by this classifier.
    fn model_name(&self) -> &str;
}

pub struct LlmClaimClassifier {
    backend: Arc<dyn LlmBackend>,
    model: Option<String>,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl LlmClaimClassifier {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            model: None,
            max_tokens: 300,
            temperature: 0.0,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ClaimClassifier for LlmClaimClassifier {
    async fn classify(&self, text: &str, prompt: &str) -> Result<Classification, LlmError> {
        let req = LlmRequest {
            messages: vec![Message::system(prompt), Message::user(text)],
            model: self.model.clone(),
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
        };

        let started = Instant::now();
        let resp = tokio::time::timeout(self.timeout, self.backend.complete(req))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout.as_secs()))??;
        let latency_ms = started.elapsed().as_millis() as u64;

        let claims = parse_claims(&resp.content)?;
        tracing::debug!(
            model = %resp.model,
            claims = claims.len(),
            latency_ms,
            "Classification complete"
        );

        Ok(Classification {
            claims,
            model: resp.model,
            prompt_tokens: resp.prompt_tokens,
            completion_tokens: resp.completion_tokens,
            latency_ms,
            raw_output: resp.content,
        })
    }

    fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or_else(|| self.backend.model_id())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ClaimsReply {
    Object { claims: Vec<String> },
    List(Vec<String>),
}

fn fenced_block_regex() -> &'static Regex {
    use std::sync::OnceLock;
    static RE: OnceLock<Regex> = OnceLock::new();
    // ```json ... ``` or bare ``` ... ```
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").unwrap())
}

/// Parse a model reply into its claim list. Markdown fences are tolerated;
/// anything else that is not the expected JSON is an invalid response.
pub fn parse_claims(raw: &str) -> Result<Vec<String>, LlmError> {
    let body = fenced_block_regex()
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw)
        .trim();

    let reply: ClaimsReply = serde_json::from_str(body).map_err(|e| {
        let preview: String = raw.chars().take(120).collect();
        LlmError::InvalidResponse(format!("expected {{\"claims\": [...]}}: {e}; got {preview:?}"))
    })?;

    let claims = match reply {
        ClaimsReply::Object { claims } | ClaimsReply::List(claims) => claims,
    };
    Ok(claims
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LlmResponse;
    use std::sync::Mutex;

    #[test]
    fn test_parse_plain_object() {
        let claims = parse_claims(r#"{"claims": ["AUPRC is preferable under imbalance."]}"#).unwrap();
        assert_eq!(claims, vec!["AUPRC is preferable under imbalance.".to_string()]);
    }

    #[test]
    fn test_parse_fenced_reply() {
        let raw = "Here you go:\n```json\n{\"claims\": [\"  PR-AUC beats ROC-AUC  \", \"\"]}\n```";
        assert_eq!(parse_claims(raw).unwrap(), vec!["PR-AUC beats ROC-AUC".to_string()]);
    }

    #[test]
    fn test_parse_bare_list_and_empty() {
        assert_eq!(parse_claims("[\"x\"]").unwrap().len(), 1);
        assert!(parse_claims("{\"claims\": []}").unwrap().is_empty());
    }

    #[test]
    fn test_prose_is_invalid_response() {
        let err = parse_claims("Yes, the document makes that claim.").unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    struct CannedBackend {
        reply: String,
        delay: Duration,
        seen: Mutex<Vec<LlmRequest>>,
    }

    #[async_trait]
    impl LlmBackend for CannedBackend {
        async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
            self.seen.lock().unwrap().push(req);
            tokio::time::sleep(self.delay).await;
            Ok(LlmResponse {
                content: self.reply.clone(),
                model: "canned-1".to_string(),
                prompt_tokens: 10,
                completion_tokens: 4,
            })
        }
        fn model_id(&self) -> &str { "canned-1" }
        fn is_local(&self) -> bool { true }
        fn max_context_tokens(&self) -> usize { 4_096 }
    }

    fn canned(reply: &str, delay: Duration) -> Arc<CannedBackend> {
        Arc::new(CannedBackend { reply: reply.to_string(), delay, seen: Mutex::new(vec![]) })
    }

    #[tokio::test]
    async fn test_classifier_sends_prompt_as_system_message() {
        let backend = canned(r#"{"claims": ["c"]}"#, Duration::ZERO);
        let clf = LlmClaimClassifier::new(backend.clone())
            .with_model(Some("gpt-4".to_string()))
            .with_max_tokens(50);

        let out = clf.classify("document text", "the prompt").await.unwrap();
        assert!(out.verdict());
        assert_eq!(clf.model_name(), "gpt-4");

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].messages[0].role, "system");
        assert_eq!(seen[0].messages[0].content, "the prompt");
        assert_eq!(seen[0].messages[1].content, "document text");
        assert_eq!(seen[0].max_tokens, Some(50));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let backend = canned("{\"claims\": []}", Duration::from_millis(200));
        let clf = LlmClaimClassifier::new(backend).with_timeout(Duration::from_millis(20));
        let err = clf.classify("t", "p").await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout(_)));
        assert_eq!(clf.model_name(), "canned-1");
    }
}
