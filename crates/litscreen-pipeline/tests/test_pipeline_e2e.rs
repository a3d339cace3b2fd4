//! Full pipeline runs against a temporary corpus, a JSONL record store, a CSV
//! ledger and scripted classifiers.
//!
//! ```bash
//! cargo test --package litscreen-pipeline --test test_pipeline_e2e -- --nocapture
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use litscreen_common::{ScreeningConfig, ScreeningStage, Verdict};
use litscreen_db::{CsvLedger, JsonlRecordStore, LedgerSink, RecordStore};
use litscreen_llm::{ClaimClassifier, Classification, LlmError};
use litscreen_pipeline::Pipeline;
use tokio_util::sync::CancellationToken;

/// Answers from markers in the text:
/// `CLAIM` → one claim, `FLAKY` → fails transiently on the first call,
/// `DOWN` → always fails transiently. Anything else → no claims.
struct ScriptedClassifier {
    model: String,
    calls: Mutex<HashMap<String, u32>>,
}

impl ScriptedClassifier {
    fn new(model: &str) -> Arc<Self> {
        Arc::new(Self { model: model.to_string(), calls: Mutex::new(HashMap::new()) })
    }

    fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl ClaimClassifier for ScriptedClassifier {
    async fn classify(&self, text: &str, _prompt: &str) -> Result<Classification, LlmError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(text.to_string()).or_insert(0);
            *n += 1;
            *n
        };
        if text.contains("DOWN") || (text.contains("FLAKY") && n == 1) {
            return Err(LlmError::ApiError { status: 503, message: "overloaded".to_string() });
        }
        let claims = if text.contains("CLAIM") {
            vec![format!("AUPRC is preferable to AUROC ({})", self.model)]
        } else {
            vec![]
        };
        Ok(Classification {
            claims,
            model: self.model.clone(),
            prompt_tokens: 100,
            completion_tokens: 10,
            latency_ms: 1,
            raw_output: "{}".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn write_fixture(root: &Path, lines: &[&str]) -> ScreeningConfig {
    std::fs::write(root.join("auroc.txt"), "AUROC\nROC AUC\n").unwrap();
    std::fs::write(root.join("auprc.txt"), "AUPRC\nPR AUC\n").unwrap();
    std::fs::write(root.join("corpus.jsonl"), lines.join("\n")).unwrap();

    serde_json::from_value(serde_json::json!({
        "keywords": {
            "topic_a_path": root.join("auroc.txt"),
            "topic_b_path": root.join("auprc.txt"),
        },
        "corpus": { "paths": [root.join("corpus.jsonl")] },
        "retry": { "max_attempts": 3, "initial_backoff_ms": 1, "max_backoff_ms": 2 },
        "execution": { "concurrency": 3, "work_dir": root.join("work") },
        "ledger": { "path": root.join("ledger.csv") },
    }))
    .unwrap()
}

async fn pipeline(
    config: ScreeningConfig,
    stage1: Arc<ScriptedClassifier>,
    stage2: Arc<ScriptedClassifier>,
) -> (Pipeline, Arc<JsonlRecordStore>, Arc<CsvLedger>) {
    let store = Arc::new(JsonlRecordStore::open(&config.execution.work_dir).await.unwrap());
    let ledger = Arc::new(CsvLedger::new(&config.ledger.path));
    let p = Pipeline::new(config, store.clone(), ledger.clone(), CancellationToken::new())
        .with_classifier(ScreeningStage::One, stage1)
        .with_classifier(ScreeningStage::Two, stage2);
    (p, store, ledger)
}

#[tokio::test]
async fn test_two_of_three_dual_documents_reach_the_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_fixture(
        dir.path(),
        &[
            r#"{"id":"p1","text":"AUROC vs AUPRC: CLAIM one."}"#,
            r#"{"id":"p2","text":"ROC AUC and PR AUC, CLAIM two."}"#,
            r#"{"id":"n1","text":"We report AUROC and AUPRC side by side."}"#,
            r#"{"id":"a1","text":"AUROC only, CLAIM ignored."}"#,
        ],
    );
    let stage1 = ScriptedClassifier::new("gpt-3.5-turbo");
    let stage2 = ScriptedClassifier::new("gpt-4");
    let (p, store, ledger) = pipeline(config, stage1.clone(), stage2.clone()).await;

    let summary = p.run_all().await.unwrap();

    assert_eq!(summary.dual_matched, 3);
    assert_eq!(summary.stage1.passed, 2);
    assert_eq!(summary.stage1.failed, 1);
    assert_eq!(stage2.total_calls(), 2, "only stage-1 positives reach stage 2");

    let stage2_ids: Vec<String> = store
        .verdicts(ScreeningStage::Two)
        .await
        .unwrap()
        .into_iter()
        .map(|v| v.document_id)
        .collect();
    let mut sorted = stage2_ids.clone();
    sorted.sort();
    assert_eq!(sorted, vec!["p1".to_string(), "p2".to_string()]);

    let entries = ledger.entries().await.unwrap();
    assert!(entries.len() <= 2);
    assert!(entries.iter().all(|e| e.document_id == "p1" || e.document_id == "p2"));
    assert!(entries.iter().all(|e| e.extracted_claim.contains("gpt-4")));
}

#[tokio::test]
async fn test_failures_are_isolated_and_end_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_fixture(
        dir.path(),
        &[
            r#"{"id":"ok","text":"AUROC AUPRC CLAIM"}"#,
            r#"{"id":"flaky","text":"AUROC AUPRC FLAKY CLAIM"}"#,
            r#"{"id":"down","text":"AUROC AUPRC DOWN"}"#,
            r#"{"id":"neg","text":"AUROC AUPRC nothing"}"#,
        ],
    );
    let (p, store, _ledger) =
        pipeline(config, ScriptedClassifier::new("s1"), ScriptedClassifier::new("s2")).await;

    p.run_filter().await.unwrap();
    let report = p.run_stage(ScreeningStage::One).await.unwrap();

    assert_eq!(report.screened, 4);
    assert_eq!(report.passed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.unknown_ids, vec!["down".to_string()]);

    let verdicts = store.verdicts(ScreeningStage::One).await.unwrap();
    let by_id: HashMap<_, _> = verdicts.iter().map(|v| (v.document_id.as_str(), v)).collect();
    assert_eq!(by_id["flaky"].verdict, Verdict::Positive);
    assert_eq!(by_id["flaky"].attempts, 2);
    assert_eq!(by_id["down"].verdict, Verdict::Unknown);
    assert_eq!(by_id["down"].attempts, 3);
    assert!(by_id["down"].error.as_deref().unwrap().contains("503"));

    let audit = std::fs::read_to_string(store.dir().join("llm_audit.jsonl")).unwrap();
    assert_eq!(audit.lines().count(), 4);
}

#[tokio::test]
async fn test_rerun_retries_only_unknown_verdicts() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_fixture(
        dir.path(),
        &[
            r#"{"id":"ok","text":"AUROC AUPRC CLAIM"}"#,
            r#"{"id":"down","text":"AUROC AUPRC DOWN CLAIM"}"#,
        ],
    );
    let stage1 = ScriptedClassifier::new("s1");
    let (p, store, _ledger) = pipeline(config.clone(), stage1.clone(), ScriptedClassifier::new("s2")).await;
    p.run_filter().await.unwrap();
    p.run_stage(ScreeningStage::One).await.unwrap();
    assert_eq!(stage1.total_calls(), 4);

    // Service recovered: a classifier that never fails.
    let healthy = Arc::new(HealthyClassifier);
    let p2 = Pipeline::new(config, store.clone(), Arc::new(litscreen_db::InMemoryLedger::new()), CancellationToken::new())
        .with_classifier(ScreeningStage::One, healthy);
    let report = p2.run_stage(ScreeningStage::One).await.unwrap();

    assert_eq!(report.already_settled, 1);
    assert_eq!(report.screened, 1);
    assert_eq!(report.passed, 1);
    let verdicts = store.verdicts(ScreeningStage::One).await.unwrap();
    assert!(verdicts.iter().all(|v| v.verdict == Verdict::Positive));
}

struct HealthyClassifier;

#[async_trait]
impl ClaimClassifier for HealthyClassifier {
    async fn classify(&self, _text: &str, _prompt: &str) -> Result<Classification, LlmError> {
        Ok(Classification {
            claims: vec!["recovered".to_string()],
            model: "s1".to_string(),
            prompt_tokens: 1,
            completion_tokens: 1,
            latency_ms: 1,
            raw_output: String::new(),
        })
    }

    fn model_name(&self) -> &str {
        "s1"
    }
}

#[tokio::test]
async fn test_export_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_fixture(
        dir.path(),
        &[
            r#"{"id":"p1","text":"AUROC AUPRC CLAIM"}"#,
            r#"{"id":"p2","text":"AUROC AUPRC CLAIM too"}"#,
        ],
    );
    let (p, _store, ledger) =
        pipeline(config, ScriptedClassifier::new("s1"), ScriptedClassifier::new("s2")).await;

    let first = p.run_all().await.unwrap();
    assert_eq!(first.export.as_ref().unwrap().exported, 2);
    assert_eq!(ledger.entries().await.unwrap().len(), 2);

    let again = p.export().await.unwrap();
    assert_eq!(again.exported, 0);
    assert_eq!(again.already_present, 2);
    assert_eq!(ledger.entries().await.unwrap().len(), 2);

    let csv = std::fs::read_to_string(ledger.path()).unwrap();
    assert!(csv.starts_with("document_id,extracted_claim,human_tag,exported_at"));
    assert_eq!(csv.lines().count(), 3);
}

#[tokio::test]
async fn test_broken_ledger_halts_export_but_not_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_fixture(dir.path(), &[r#"{"id":"p1","text":"AUROC AUPRC CLAIM"}"#]);
    // A directory where the ledger file should be: unreadable and unwritable.
    std::fs::create_dir(&config.ledger.path).unwrap();
    let (p, store, _ledger) =
        pipeline(config, ScriptedClassifier::new("s1"), ScriptedClassifier::new("s2")).await;

    let summary = p.run_all().await.unwrap();

    assert_eq!(summary.stage2.passed, 1);
    assert_eq!(store.verdicts(ScreeningStage::Two).await.unwrap().len(), 1);
    let export = summary.export.as_ref().unwrap();
    assert_eq!(export.exported, 0);
    assert!(export.error.as_deref().unwrap().starts_with("Review ledger error"));
    assert_eq!(summary.ledger_entries, None);
    assert!(summary.ledger_error.is_some());
}

#[tokio::test]
async fn test_hand_edited_ledger_does_not_block_export() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_fixture(
        dir.path(),
        &[
            r#"{"id":"p1","text":"AUROC AUPRC CLAIM"}"#,
            r#"{"id":"p2","text":"AUROC AUPRC CLAIM too"}"#,
        ],
    );
    // Reviewer cleared one tag, capitalised another and saved without a final newline.
    std::fs::write(
        &config.ledger.path,
        "document_id,extracted_claim,human_tag,exported_at\n\
         old-1,earlier claim,,2024-01-02T03:04:05Z\n\
         p2,earlier claim,Green,2024-01-02T03:04:05Z",
    )
    .unwrap();
    let (p, _store, ledger) =
        pipeline(config, ScriptedClassifier::new("s1"), ScriptedClassifier::new("s2")).await;

    let summary = p.run_all().await.unwrap();

    let export = summary.export.as_ref().unwrap();
    assert!(export.error.is_none());
    assert_eq!(export.exported, 1);
    assert_eq!(export.already_present, 1);
    let ids: Vec<String> = ledger.entries().await.unwrap().into_iter().map(|e| e.document_id).collect();
    assert_eq!(ids, vec!["old-1".to_string(), "p2".to_string(), "p1".to_string()]);
    assert_eq!(summary.ledger_entries, Some(3));
}
