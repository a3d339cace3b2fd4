//! Review ledger export.
//!
//! Stage-2 survivors with an extracted claim are appended to the ledger.
//! Documents already in the ledger are left alone, so exporting twice
//! changes nothing. Ledger failures are retried; if they persist the export
//! step stops and reports the error, and the rest of the run is unaffected.

use std::collections::HashSet;

use litscreen_common::{LitscreenError, Result, RetryPolicy, ReviewEntry, ScreeningStage};
use litscreen_db::{LedgerSink, RecordStore};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportReport {
    /// Positive stage-2 verdicts.
    pub survivors: usize,
    pub exported: usize,
    pub already_present: usize,
    /// Survivors whose verdict carried no claim text.
    pub missing_claim: usize,
    /// Set when the ledger could not be read or written.
    pub error: Option<String>,
}

#[instrument(skip_all)]
pub async fn export_survivors(
    store: &dyn RecordStore,
    ledger: &dyn LedgerSink,
    retry: &RetryPolicy,
) -> Result<ExportReport> {
    let mut report = ExportReport::default();

    let survivors: Vec<_> = store
        .verdicts(ScreeningStage::Two)
        .await?
        .into_iter()
        .filter(|v| v.is_positive())
        .collect();
    report.survivors = survivors.len();

    let existing = retry.run("ledger read", || ledger.existing_ids()).await;
    let mut present: HashSet<String> = match existing.result {
        Ok(ids) => ids,
        Err(e) => {
            let err = LitscreenError::Ledger(format!("read failed after {} attempts: {e}", existing.attempts));
            error!(error = %err, "Export halted");
            report.error = Some(err.to_string());
            return Ok(report);
        }
    };

    let mut fresh: Vec<ReviewEntry> = Vec::new();
    for verdict in survivors {
        let Some(claim) = verdict.extracted_claim.filter(|c| !c.trim().is_empty()) else {
            warn!(document_id = %verdict.document_id, "Positive verdict without claim text, not exported");
            report.missing_claim += 1;
            continue;
        };
        if !present.insert(verdict.document_id.clone()) {
            report.already_present += 1;
            continue;
        }
        fresh.push(ReviewEntry::new(verdict.document_id, claim));
    }

    if !fresh.is_empty() {
        let written = retry.run("ledger write", || ledger.append_entries(&fresh)).await;
        match written.result {
            Ok(()) => report.exported = fresh.len(),
            Err(e) => {
                let err = LitscreenError::Ledger(format!("write failed after {} attempts: {e}", written.attempts));
                error!(error = %err, pending = fresh.len(), "Export halted");
                report.error = Some(err.to_string());
            }
        }
    }

    info!(
        survivors = report.survivors,
        exported = report.exported,
        already_present = report.already_present,
        "Ledger export complete"
    );
    Ok(report)
}
