//! Pipeline orchestrator.
//!
//! corpus → keyword filter → dual-mention selector → stage 1 → stage 2 →
//! review ledger. Each step reads its inputs from the record store, so steps
//! can be run one at a time (`litscreen screen --stage 2`) or all together.

use std::collections::HashMap;
use std::sync::Arc;

use litscreen_common::{FilterStats, LitscreenError, Result, ScreeningConfig, ScreeningStage};
use litscreen_db::{LedgerSink, RecordStore};
use litscreen_ingestion::{run_keyword_filter, JsonlCorpus, KeywordMatcher, KeywordSet};
use litscreen_llm::ClaimClassifier;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::export::{export_survivors, ExportReport};
use crate::screening::{run_stage, StageReport, StageSettings};
use crate::summary::RunSummary;

pub struct Pipeline {
    config: ScreeningConfig,
    store: Arc<dyn RecordStore>,
    ledger: Arc<dyn LedgerSink>,
    classifiers: HashMap<ScreeningStage, Arc<dyn ClaimClassifier>>,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(
        config: ScreeningConfig,
        store: Arc<dyn RecordStore>,
        ledger: Arc<dyn LedgerSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self { config, store, ledger, classifiers: HashMap::new(), cancel }
    }

    /// Attach the classifier a stage screens with.
    pub fn with_classifier(mut self, stage: ScreeningStage, classifier: Arc<dyn ClaimClassifier>) -> Self {
        self.classifiers.insert(stage, classifier);
        self
    }

    pub fn config(&self) -> &ScreeningConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Keyword filter plus dual-mention selection. The store keeps its
    /// previous filter output when the scan is cancelled part way.
    #[instrument(skip(self))]
    pub async fn run_filter(&self) -> Result<FilterStats> {
        let kw = &self.config.keywords;
        let topic_a = KeywordSet::load(kw.topic_a_name.clone(), &kw.topic_a_path)?;
        let topic_b = KeywordSet::load(kw.topic_b_name.clone(), &kw.topic_b_path)?;
        let matcher = Arc::new(KeywordMatcher::new(topic_a, topic_b)?);

        let corpus = JsonlCorpus::new(self.config.corpus.paths.clone());
        let outcome = run_keyword_filter(
            &corpus,
            matcher,
            self.config.corpus.skip_duplicates,
            self.cancel.clone(),
        )
        .await?;

        if outcome.cancelled {
            warn!("Filter cancelled; previous filter output left in place");
        } else {
            self.store
                .replace_filter_output(&outcome.records, &outcome.candidates, &outcome.errors, &outcome.stats)
                .await?;
        }
        Ok(outcome.stats)
    }

    pub async fn run_stage(&self, stage: ScreeningStage) -> Result<StageReport> {
        let classifier = self.classifiers.get(&stage).cloned().ok_or_else(|| {
            LitscreenError::Config(format!("no classifier configured for {stage}"))
        })?;
        let settings = StageSettings::from_config(&self.config, stage)?;
        run_stage(self.store.clone(), classifier, &settings, self.cancel.clone()).await
    }

    pub async fn export(&self) -> Result<ExportReport> {
        export_survivors(self.store.as_ref(), self.ledger.as_ref(), &self.config.retry).await
    }

    pub async fn summary(&self, export: Option<ExportReport>) -> Result<RunSummary> {
        RunSummary::collect(self.store.as_ref(), self.ledger.as_ref(), export).await
    }

    /// Every step in order. Stops after the current step on cancellation;
    /// rerunning resumes from the stored verdicts.
    #[instrument(skip(self))]
    pub async fn run_all(&self) -> Result<RunSummary> {
        info!("Starting full screening run");

        self.run_filter().await?;
        if self.cancel.is_cancelled() {
            return self.summary(None).await;
        }

        for stage in [ScreeningStage::One, ScreeningStage::Two] {
            let report = self.run_stage(stage).await?;
            if report.cancelled || self.cancel.is_cancelled() {
                return self.summary(None).await;
            }
        }

        let export = self.export().await?;
        let summary = self.summary(Some(export)).await?;
        info!(
            dual = summary.dual_matched,
            stage1_passed = summary.stage1.passed,
            stage2_passed = summary.stage2.passed,
            unknown = summary.unknown_total(),
            ledger = ?summary.ledger_entries,
            "Screening run complete"
        );
        Ok(summary)
    }
}
