//! Audit records for LLM calls.
//!
//! One entry per classified document and stage. The raw model output is not
//! kept, only its SHA-256, so the audit log stays small and free of corpus
//! text.

use chrono::Utc;
use litscreen_common::ScreeningStage;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::classification::Classification;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAuditEntry {
    pub id: Uuid,
    pub document_id: String,
    pub stage: ScreeningStage,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    /// Empty when the call failed.
    pub output_hash: String,
    pub latency_ms: u64,
    pub attempts: u32,
    /// "ok" or the error message of the last attempt.
    pub outcome: String,
    pub called_at: chrono::DateTime<Utc>,
}

impl LlmAuditEntry {
    pub fn success(
        document_id: &str,
        stage: ScreeningStage,
        classification: &Classification,
        attempts: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id: document_id.to_string(),
            stage,
            model: classification.model.clone(),
            prompt_tokens: classification.prompt_tokens,
            completion_tokens: classification.completion_tokens,
            output_hash: output_hash(&classification.raw_output),
            latency_ms: classification.latency_ms,
            attempts,
            outcome: "ok".to_string(),
            called_at: Utc::now(),
        }
    }

    pub fn failure(
        document_id: &str,
        stage: ScreeningStage,
        model: &str,
        error: &str,
        attempts: u32,
        latency_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id: document_id.to_string(),
            stage,
            model: model.to_string(),
            prompt_tokens: 0,
            completion_tokens: 0,
            output_hash: String::new(),
            latency_ms,
            attempts,
            outcome: error.to_string(),
            called_at: Utc::now(),
        }
    }
}

pub fn output_hash(output: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(output.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_entry_hashes_output() {
        let c = Classification {
            claims: vec!["x".to_string()],
            model: "gpt-4".to_string(),
            prompt_tokens: 900,
            completion_tokens: 12,
            latency_ms: 840,
            raw_output: "{\"claims\": [\"x\"]}".to_string(),
        };
        let e = LlmAuditEntry::success("doc-1", ScreeningStage::Two, &c, 2);
        assert_eq!(e.output_hash, output_hash(&c.raw_output));
        assert_eq!(e.output_hash.len(), 64);
        assert_eq!(e.outcome, "ok");

        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["stage"], 2);
    }

    #[test]
    fn test_failure_entry_has_no_hash() {
        let e = LlmAuditEntry::failure("doc-2", ScreeningStage::One, "gpt-3.5-turbo", "Rate limit exceeded", 3, 0);
        assert!(e.output_hash.is_empty());
        assert_eq!(e.attempts, 3);
    }
}
