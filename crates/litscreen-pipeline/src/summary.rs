//! Run summary.
//!
//! Built from what the record store and ledger hold, so `litscreen summary`
//! reports the same numbers after the fact as a full run does at its end.

use std::fmt;

use litscreen_common::{LitscreenError, Result, ScreeningStage, ScreeningVerdict, Verdict};
use litscreen_db::{LedgerSink, RecordStore};
use litscreen_ingestion::select_dual_mentions;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::export::ExportReport;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub passed: usize,
    pub failed: usize,
    pub unknown: usize,
    /// Documents whose latest verdict is unknown; need manual inspection.
    pub unknown_ids: Vec<String>,
}

impl StageCounts {
    pub fn from_verdicts(verdicts: &[ScreeningVerdict]) -> Self {
        let mut counts = Self::default();
        for v in verdicts {
            match v.verdict {
                Verdict::Positive => counts.passed += 1,
                Verdict::Negative => counts.failed += 1,
                Verdict::Unknown => {
                    counts.unknown += 1;
                    counts.unknown_ids.push(v.document_id.clone());
                }
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub documents_read: usize,
    pub duplicates_skipped: usize,
    pub corpus_errors: usize,
    pub topic_a_matched: usize,
    pub topic_b_matched: usize,
    pub dual_matched: usize,
    pub stage1: StageCounts,
    pub stage2: StageCounts,
    /// `None` when the ledger could not be read; see `ledger_error`.
    pub ledger_entries: Option<usize>,
    pub ledger_error: Option<String>,
    /// Present when this run exported to the ledger.
    pub export: Option<ExportReport>,
}

impl RunSummary {
    pub async fn collect(
        store: &dyn RecordStore,
        ledger: &dyn LedgerSink,
        export: Option<ExportReport>,
    ) -> Result<Self> {
        let records = store.match_records().await?;
        let stats = store.filter_stats().await?.unwrap_or_default();

        // A broken ledger only affects the export step; still report the rest.
        let (ledger_entries, ledger_error) = match ledger.entries().await {
            Ok(entries) => (Some(entries.len()), None),
            Err(e) => {
                let err = LitscreenError::Ledger(format!("read failed: {e}"));
                warn!(error = %err, "Ledger unavailable for the summary");
                (None, Some(err.to_string()))
            }
        };

        Ok(Self {
            documents_read: stats.documents_read,
            duplicates_skipped: stats.duplicates_skipped,
            corpus_errors: store.corpus_errors().await?.len(),
            topic_a_matched: records.iter().filter(|r| r.matched_topic_a).count(),
            topic_b_matched: records.iter().filter(|r| r.matched_topic_b).count(),
            dual_matched: select_dual_mentions(records).len(),
            stage1: StageCounts::from_verdicts(&store.verdicts(ScreeningStage::One).await?),
            stage2: StageCounts::from_verdicts(&store.verdicts(ScreeningStage::Two).await?),
            ledger_entries,
            ledger_error,
            export,
        })
    }

    pub fn unknown_total(&self) -> usize {
        self.stage1.unknown + self.stage2.unknown
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Keyword filter")?;
        writeln!(f, "  documents read      {:>8}", self.documents_read)?;
        writeln!(f, "  duplicates skipped  {:>8}", self.duplicates_skipped)?;
        writeln!(f, "  corpus errors       {:>8}", self.corpus_errors)?;
        writeln!(f, "  topic A matched     {:>8}", self.topic_a_matched)?;
        writeln!(f, "  topic B matched     {:>8}", self.topic_b_matched)?;
        writeln!(f, "  dual-matched        {:>8}", self.dual_matched)?;
        for (name, c) in [("Stage 1", &self.stage1), ("Stage 2", &self.stage2)] {
            writeln!(f, "{name}")?;
            writeln!(f, "  passed              {:>8}", c.passed)?;
            writeln!(f, "  failed              {:>8}", c.failed)?;
            writeln!(f, "  unknown             {:>8}", c.unknown)?;
        }
        writeln!(f, "Review ledger")?;
        match (self.ledger_entries, &self.ledger_error) {
            (Some(n), _) => writeln!(f, "  entries             {n:>8}")?,
            (None, Some(err)) => writeln!(f, "  entries          unavailable ({err})")?,
            (None, None) => writeln!(f, "  entries          unavailable")?,
        }
        if let Some(ref export) = self.export {
            writeln!(f, "  exported this run   {:>8}", export.exported)?;
            writeln!(f, "  already present     {:>8}", export.already_present)?;
            if let Some(ref err) = export.error {
                writeln!(f, "  export halted: {err}")?;
            }
        }
        if self.unknown_total() > 0 {
            writeln!(f, "Unknown verdicts (inspect manually)")?;
            for (name, c) in [("stage 1", &self.stage1), ("stage 2", &self.stage2)] {
                for id in &c.unknown_ids {
                    writeln!(f, "  {name}: {id}")?;
                }
            }
        }
        Ok(())
    }
}
