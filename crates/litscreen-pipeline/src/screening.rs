//! LLM screening stage runner.
//!
//! One runner serves both stages; they differ in which documents are
//! eligible and how much of each document is sent:
//!
//! - stage 1 screens the filter's candidates excerpt by excerpt and stops
//!   at the first excerpt the model finds a claim in
//! - stage 2 screens stage-1 positives, sending the whole document when it
//!   fits the budget and otherwise a window centred on the stage-1 excerpt
//!
//! Documents that already carry a true/false verdict for the stage are
//! skipped, so an interrupted run picks up where it stopped and unknown
//! verdicts get another try.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use futures_util::{stream, StreamExt};
use litscreen_common::{
    Document, Result, RetryOutcome, RetryPolicy, ScreeningConfig, ScreeningStage, ScreeningVerdict,
    Verdict,
};
use litscreen_db::RecordStore;
use litscreen_ingestion::chunker::{excerpt_midpoint, fits, split_excerpts, window_around};
use litscreen_llm::{ClaimClassifier, Classification, LlmAuditEntry, LlmError};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Everything a stage run needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct StageSettings {
    pub stage: ScreeningStage,
    pub prompt: String,
    pub max_excerpt_tokens: usize,
    /// Stage 1: cap on excerpts screened per document; `None` screens all.
    pub max_excerpts_per_document: Option<usize>,
    /// Excerpt size used by stage 1; locates its positive excerpt in stage 2.
    pub stage1_excerpt_tokens: usize,
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl StageSettings {
    pub fn from_config(cfg: &ScreeningConfig, stage: ScreeningStage) -> Result<Self> {
        let stage_cfg = cfg.stage(stage);
        Ok(Self {
            stage,
            prompt: stage_cfg.resolve_prompt(stage)?,
            max_excerpt_tokens: stage_cfg.max_excerpt_tokens,
            max_excerpts_per_document: stage_cfg.max_excerpts_per_document.map(|n| n.max(1)),
            stage1_excerpt_tokens: cfg.stage1.max_excerpt_tokens,
            concurrency: cfg.execution.concurrency.max(1),
            retry: cfg.retry.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    /// Documents this stage could screen.
    pub eligible: usize,
    /// Skipped because a true/false verdict already exists.
    pub already_settled: usize,
    pub screened: usize,
    pub passed: usize,
    pub failed: usize,
    pub unknown: usize,
    pub unknown_ids: Vec<String>,
    /// Verdicts that could not be written to the record store.
    pub store_errors: usize,
    /// Cancellation stopped the stage before its queue was drained.
    pub cancelled: bool,
}

struct Job {
    doc: Document,
    /// Stage-1 excerpt that produced the positive verdict.
    anchor_excerpt: Option<usize>,
}

/// Screen every eligible, unsettled document of `settings.stage`.
#[instrument(skip_all, fields(stage = %settings.stage))]
pub async fn run_stage(
    store: Arc<dyn RecordStore>,
    classifier: Arc<dyn ClaimClassifier>,
    settings: &StageSettings,
    cancel: CancellationToken,
) -> Result<StageReport> {
    let mut report = StageReport::default();

    let jobs = eligible_jobs(store.as_ref(), settings.stage).await?;
    report.eligible = jobs.len();

    let settled: HashSet<String> = store
        .verdicts(settings.stage)
        .await?
        .into_iter()
        .filter(|v| v.verdict.is_settled())
        .map(|v| v.document_id)
        .collect();

    // Each id is claimed once so workers never write the same document.
    let mut claimed: HashSet<String> = HashSet::new();
    let queue: Vec<Job> = jobs
        .into_iter()
        .filter(|job| {
            if settled.contains(&job.doc.identifier) {
                report.already_settled += 1;
                return false;
            }
            claimed.insert(job.doc.identifier.clone())
        })
        .collect();
    let queued = queue.len();

    info!(
        eligible = report.eligible,
        already_settled = report.already_settled,
        queued,
        model = classifier.model_name(),
        concurrency = settings.concurrency,
        "Starting screening stage"
    );

    let results = stream::iter(queue)
        .take_until(cancel.cancelled())
        .map(|job| screen_document(job, store.as_ref(), classifier.as_ref(), settings))
        .buffer_unordered(settings.concurrency);
    tokio::pin!(results);

    while let Some(verdict) = results.next().await {
        report.screened += 1;
        match verdict.verdict {
            Verdict::Positive => report.passed += 1,
            Verdict::Negative => report.failed += 1,
            Verdict::Unknown => {
                report.unknown += 1;
                report.unknown_ids.push(verdict.document_id.clone());
            }
        }
        info!(
            document_id = %verdict.document_id,
            model = %verdict.model_name,
            verdict = verdict.verdict.as_str(),
            attempts = verdict.attempts,
            "Verdict recorded"
        );
        if let Err(e) = store.append_verdict(&verdict).await {
            report.store_errors += 1;
            warn!(document_id = %verdict.document_id, error = %e, "Failed to store verdict");
        }
    }

    report.cancelled = report.screened < queued;
    if report.cancelled {
        warn!(screened = report.screened, queued, "Screening stage cancelled");
    }
    info!(
        passed = report.passed,
        failed = report.failed,
        unknown = report.unknown,
        "Screening stage complete"
    );
    Ok(report)
}

async fn eligible_jobs(store: &dyn RecordStore, stage: ScreeningStage) -> Result<Vec<Job>> {
    let candidates = store.candidates().await?;
    match stage {
        ScreeningStage::One => Ok(candidates
            .into_iter()
            .map(|doc| Job { doc, anchor_excerpt: None })
            .collect()),
        ScreeningStage::Two => {
            let positives: HashMap<String, Option<usize>> = store
                .verdicts(ScreeningStage::One)
                .await?
                .into_iter()
                .filter(ScreeningVerdict::is_positive)
                .map(|v| (v.document_id, v.excerpt_index))
                .collect();
            Ok(candidates
                .into_iter()
                .filter_map(|doc| {
                    let anchor_excerpt = *positives.get(&doc.identifier)?;
                    Some(Job { doc, anchor_excerpt })
                })
                .collect())
        }
    }
}

async fn screen_document(
    job: Job,
    store: &dyn RecordStore,
    classifier: &dyn ClaimClassifier,
    settings: &StageSettings,
) -> ScreeningVerdict {
    match settings.stage {
        ScreeningStage::One => screen_excerpts(job, store, classifier, settings).await,
        ScreeningStage::Two => screen_window(job, store, classifier, settings).await,
    }
}

async fn screen_excerpts(
    job: Job,
    store: &dyn RecordStore,
    classifier: &dyn ClaimClassifier,
    settings: &StageSettings,
) -> ScreeningVerdict {
    let id = job.doc.identifier.as_str();
    let excerpts = split_excerpts(&job.doc.raw_text, settings.max_excerpt_tokens);
    let mut model = classifier.model_name().to_string();
    let mut attempts = 0;
    let mut last_error: Option<String> = None;

    let limit = settings.max_excerpts_per_document.unwrap_or(excerpts.len());
    for excerpt in excerpts.iter().take(limit) {
        let outcome = classify_audited(id, &excerpt.text, store, classifier, settings).await;
        attempts += outcome.attempts;
        match outcome.result {
            Ok(c) if c.verdict() => {
                return build_verdict(id, settings.stage, c.model, Verdict::Positive, c.claims, attempts, Some(excerpt.index), None);
            }
            Ok(c) => model = c.model,
            Err(e) => {
                warn!(document_id = id, excerpt = excerpt.index, error = %e, "Excerpt could not be screened");
                last_error = Some(e.to_string());
            }
        }
    }

    // Unscreened excerpts may hold the claim: not a negative.
    if last_error.is_none() && excerpts.len() > limit {
        warn!(document_id = id, screened = limit, excerpts = excerpts.len(), "Excerpt cap reached without a claim");
        last_error = Some(format!("excerpt cap reached: screened {limit} of {} excerpts", excerpts.len()));
    }

    let verdict = if last_error.is_some() { Verdict::Unknown } else { Verdict::Negative };
    build_verdict(id, settings.stage, model, verdict, vec![], attempts, None, last_error)
}

async fn screen_window(
    job: Job,
    store: &dyn RecordStore,
    classifier: &dyn ClaimClassifier,
    settings: &StageSettings,
) -> ScreeningVerdict {
    let id = job.doc.identifier.as_str();
    let raw = &job.doc.raw_text;
    let text = if fits(raw, settings.max_excerpt_tokens) {
        raw.clone()
    } else {
        let center = excerpt_midpoint(job.anchor_excerpt.unwrap_or(0), settings.stage1_excerpt_tokens);
        window_around(raw, center, settings.max_excerpt_tokens)
    };

    let outcome = classify_audited(id, &text, store, classifier, settings).await;
    match outcome.result {
        Ok(c) => {
            let verdict = Verdict::from_bool(c.verdict());
            build_verdict(id, settings.stage, c.model, verdict, c.claims, outcome.attempts, job.anchor_excerpt, None)
        }
        Err(e) => {
            warn!(document_id = id, error = %e, "Document could not be screened");
            build_verdict(
                id,
                settings.stage,
                classifier.model_name().to_string(),
                Verdict::Unknown,
                vec![],
                outcome.attempts,
                job.anchor_excerpt,
                Some(e.to_string()),
            )
        }
    }
}

/// Classify with retries and append one audit entry for the call.
async fn classify_audited(
    document_id: &str,
    text: &str,
    store: &dyn RecordStore,
    classifier: &dyn ClaimClassifier,
    settings: &StageSettings,
) -> RetryOutcome<Classification, LlmError> {
    let started = Instant::now();
    let outcome = settings
        .retry
        .run("classify", || classifier.classify(text, &settings.prompt))
        .await;

    let entry = match &outcome.result {
        Ok(c) => LlmAuditEntry::success(document_id, settings.stage, c, outcome.attempts),
        Err(e) => LlmAuditEntry::failure(
            document_id,
            settings.stage,
            classifier.model_name(),
            &e.to_string(),
            outcome.attempts,
            started.elapsed().as_millis() as u64,
        ),
    };
    match serde_json::to_value(&entry) {
        Ok(value) => {
            if let Err(e) = store.append_audit(&value).await {
                warn!(document_id, error = %e, "Failed to write audit entry");
            }
        }
        Err(e) => warn!(document_id, error = %e, "Failed to encode audit entry"),
    }
    outcome
}

#[allow(clippy::too_many_arguments)]
fn build_verdict(
    document_id: &str,
    stage: ScreeningStage,
    model_name: String,
    verdict: Verdict,
    claims: Vec<String>,
    attempts: u32,
    excerpt_index: Option<usize>,
    error: Option<String>,
) -> ScreeningVerdict {
    ScreeningVerdict {
        document_id: document_id.to_string(),
        stage,
        model_name,
        verdict,
        extracted_claim: (!claims.is_empty()).then(|| claims.join(" | ")),
        claims,
        attempts,
        excerpt_index,
        error,
        screened_at: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use litscreen_db::InMemoryRecordStore;
    use litscreen_common::FilterStats;
    use std::sync::Mutex;

    /// Replies with a claim when the text contains "claim", records inputs.
    struct KeywordClassifier {
        inputs: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ClaimClassifier for KeywordClassifier {
        async fn classify(&self, text: &str, _prompt: &str) -> std::result::Result<Classification, LlmError> {
            self.inputs.lock().unwrap().push(text.to_string());
            let claims = if text.contains("claim") { vec!["AUPRC wins".to_string()] } else { vec![] };
            Ok(Classification {
                claims,
                model: "kw-1".to_string(),
                prompt_tokens: 1,
                completion_tokens: 1,
                latency_ms: 0,
                raw_output: String::new(),
            })
        }
        fn model_name(&self) -> &str { "kw-1" }
    }

    fn settings(stage: ScreeningStage, max_tokens: usize) -> StageSettings {
        StageSettings {
            stage,
            prompt: "p".to_string(),
            max_excerpt_tokens: max_tokens,
            max_excerpts_per_document: None,
            stage1_excerpt_tokens: 4,
            concurrency: 2,
            retry: RetryPolicy { max_attempts: 2, initial_backoff_ms: 1, max_backoff_ms: 1 },
        }
    }

    fn doc(id: &str, text: &str) -> Document {
        Document { identifier: id.to_string(), raw_text: text.to_string(), source_path: "t".to_string() }
    }

    #[tokio::test]
    async fn test_stage1_stops_at_first_positive_excerpt() {
        let store = Arc::new(InMemoryRecordStore::new());
        // 4 tokens -> 3 words per excerpt
        let text = "one two three four five claim six seven eight nine ten eleven";
        store.replace_filter_output(&[], &[doc("d", text)], &[], &FilterStats::default()).await.unwrap();
        let clf = Arc::new(KeywordClassifier { inputs: Mutex::new(vec![]) });

        let report = run_stage(store.clone(), clf.clone(), &settings(ScreeningStage::One, 4), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.passed, 1);
        assert_eq!(clf.inputs.lock().unwrap().len(), 2);
        let v = &store.verdicts(ScreeningStage::One).await.unwrap()[0];
        assert_eq!(v.excerpt_index, Some(1));
        assert_eq!(v.extracted_claim.as_deref(), Some("AUPRC wins"));
        assert_eq!(store.audit_entries().len(), 2);
    }

    #[tokio::test]
    async fn test_stage2_sends_window_around_stage1_excerpt() {
        let store = Arc::new(InMemoryRecordStore::new());
        let words: Vec<String> = (0..60).map(|i| if i == 31 { "claim".to_string() } else { format!("w{i}") }).collect();
        store
            .replace_filter_output(&[], &[doc("d", &words.join(" "))], &[], &FilterStats::default())
            .await
            .unwrap();
        let clf = Arc::new(KeywordClassifier { inputs: Mutex::new(vec![]) });

        run_stage(store.clone(), clf.clone(), &settings(ScreeningStage::One, 4), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(store.verdicts(ScreeningStage::One).await.unwrap()[0].excerpt_index, Some(10));

        // 8 tokens -> 6 word window; the whole document does not fit.
        let report = run_stage(store.clone(), clf.clone(), &settings(ScreeningStage::Two, 8), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.passed, 1);
        let sent = clf.inputs.lock().unwrap().last().cloned().unwrap();
        assert_eq!(sent.split_whitespace().count(), 6);
        assert!(sent.contains("claim"));
    }

    #[tokio::test]
    async fn test_settled_documents_are_not_rescreened() {
        let store = Arc::new(InMemoryRecordStore::new());
        store
            .replace_filter_output(&[], &[doc("a", "claim"), doc("b", "nothing")], &[], &FilterStats::default())
            .await
            .unwrap();
        let clf = Arc::new(KeywordClassifier { inputs: Mutex::new(vec![]) });
        let s = settings(ScreeningStage::One, 100);

        run_stage(store.clone(), clf.clone(), &s, CancellationToken::new()).await.unwrap();
        let again = run_stage(store.clone(), clf.clone(), &s, CancellationToken::new()).await.unwrap();

        assert_eq!(again.already_settled, 2);
        assert_eq!(again.screened, 0);
        assert_eq!(clf.inputs.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_stage_claims_nothing() {
        let store = Arc::new(InMemoryRecordStore::new());
        store.replace_filter_output(&[], &[doc("a", "claim")], &[], &FilterStats::default()).await.unwrap();
        let clf = Arc::new(KeywordClassifier { inputs: Mutex::new(vec![]) });
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = run_stage(store.clone(), clf, &settings(ScreeningStage::One, 100), cancel).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.screened, 0);
        assert!(store.verdicts(ScreeningStage::One).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_claim_past_excerpt_cap_is_not_negative() {
        let store = Arc::new(InMemoryRecordStore::new());
        // 4 tokens -> 3 words per excerpt; the claim sits in excerpt 3.
        let text = "w0 w1 w2 w3 w4 w5 w6 w7 w8 claim w10 w11";
        store.replace_filter_output(&[], &[doc("d", text)], &[], &FilterStats::default()).await.unwrap();
        let clf = Arc::new(KeywordClassifier { inputs: Mutex::new(vec![]) });

        let capped = StageSettings { max_excerpts_per_document: Some(2), ..settings(ScreeningStage::One, 4) };
        let report = run_stage(store.clone(), clf.clone(), &capped, CancellationToken::new()).await.unwrap();
        assert_eq!(report.unknown_ids, vec!["d".to_string()]);
        let v = &store.verdicts(ScreeningStage::One).await.unwrap()[0];
        assert_eq!(v.verdict, Verdict::Unknown);
        assert!(v.error.as_deref().unwrap().contains("screened 2 of 4"));

        // Without a cap every excerpt is screened and the claim is found.
        let report = run_stage(store.clone(), clf.clone(), &settings(ScreeningStage::One, 4), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.passed, 1);
        let v = &store.verdicts(ScreeningStage::One).await.unwrap()[0];
        assert_eq!(v.excerpt_index, Some(3));
    }
}
