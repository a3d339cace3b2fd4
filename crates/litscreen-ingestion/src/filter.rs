//! Keyword filter stage.
//!
//! Streams every corpus file, tags each document with the topics it matches
//! and keeps the dual-mention documents as candidates for the LLM stages.
//! Files are scanned one at a time on the blocking pool; the duplicate
//! tracker moves in and out of each blocking task so fingerprints are shared
//! across the whole run.

use crate::corpus::{read_documents, JsonlCorpus};
use crate::dedup::{SeenDocuments, Sighting};
use crate::keywords::normalise;
use crate::matcher::KeywordMatcher;
use litscreen_common::{CorpusErrorRecord, Document, FilterStats, LitscreenError, MatchRecord, Result};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Default)]
pub struct FilterOutcome {
    /// One record per unique document, in corpus order.
    pub records: Vec<MatchRecord>,
    /// Dual-mention documents, in corpus order.
    pub candidates: Vec<Document>,
    pub errors: Vec<CorpusErrorRecord>,
    pub stats: FilterStats,
    /// The scan stopped early; the outcome covers only part of the corpus.
    pub cancelled: bool,
}

#[derive(Default)]
struct FileScan {
    records: Vec<MatchRecord>,
    candidates: Vec<Document>,
    errors: Vec<CorpusErrorRecord>,
    stats: FilterStats,
    cancelled: bool,
}

/// Run the keyword filter over the whole corpus.
///
/// Unreadable files and malformed lines become error records and the scan
/// goes on. Only an unusable corpus configuration (no paths, a path that
/// does not exist) fails the stage.
#[instrument(skip(corpus, matcher, cancel))]
pub async fn run_keyword_filter(
    corpus: &JsonlCorpus,
    matcher: Arc<KeywordMatcher>,
    skip_duplicates: bool,
    cancel: CancellationToken,
) -> Result<FilterOutcome> {
    let files = corpus.files().map_err(|e| LitscreenError::Config(format!("{e:#}")))?;
    let terms = matcher.stats();
    info!(
        files = files.len(),
        topic_a_terms = terms.topic_a_terms,
        topic_b_terms = terms.topic_b_terms,
        patterns = terms.total_patterns,
        skip_duplicates,
        "Starting keyword filter"
    );

    let mut outcome = FilterOutcome::default();
    let mut seen = SeenDocuments::new();

    for path in files {
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            break;
        }

        let matcher = matcher.clone();
        let token = cancel.clone();
        let (scan, returned) = tokio::task::spawn_blocking(move || {
            let mut seen = seen;
            let scan = scan_file(&path, &matcher, &mut seen, skip_duplicates, &token);
            (scan, seen)
        })
        .await
        .map_err(|e| LitscreenError::Other(anyhow::anyhow!("filter task failed: {e}")))?;
        seen = returned;

        outcome.stats.absorb(&scan.stats);
        outcome.records.extend(scan.records);
        outcome.candidates.extend(scan.candidates);
        outcome.errors.extend(scan.errors);
        if scan.cancelled {
            outcome.cancelled = true;
            break;
        }
    }

    if outcome.cancelled {
        warn!(documents = outcome.stats.documents_read, "Keyword filter cancelled");
    }
    info!(
        documents = outcome.stats.documents_read,
        duplicates = outcome.stats.duplicates_skipped,
        errors = outcome.stats.corpus_errors,
        topic_a = outcome.stats.topic_a_matched,
        topic_b = outcome.stats.topic_b_matched,
        dual = outcome.stats.dual_matched,
        "Keyword filter complete"
    );
    Ok(outcome)
}

fn scan_file(
    path: &Path,
    matcher: &KeywordMatcher,
    seen: &mut SeenDocuments,
    skip_duplicates: bool,
    cancel: &CancellationToken,
) -> FileScan {
    let mut scan = FileScan::default();

    let documents = match read_documents(path) {
        Ok(docs) => docs,
        Err(e) => {
            warn!(location = %e.location(), error = %e.message, "Skipping unreadable corpus file");
            scan.stats.corpus_errors += 1;
            scan.errors.push(e);
            return scan;
        }
    };
    scan.stats.files_read = 1;

    for item in documents {
        if cancel.is_cancelled() {
            scan.cancelled = true;
            break;
        }

        let doc = match item {
            Ok(doc) => doc,
            Err(e) => {
                warn!(location = %e.location(), error = %e.message, "Skipping corpus line");
                scan.stats.corpus_errors += 1;
                scan.errors.push(e);
                continue;
            }
        };
        scan.stats.documents_read += 1;

        let text = normalise(&doc.raw_text);
        match seen.observe(&doc.identifier, &text, skip_duplicates) {
            Sighting::New => {}
            Sighting::DuplicateContent => {
                debug!(document_id = %doc.identifier, "Duplicate content skipped");
                scan.stats.duplicates_skipped += 1;
                continue;
            }
            Sighting::DuplicateIdentifier => {
                warn!(document_id = %doc.identifier, source = %doc.source_path, "Identifier already used");
                scan.stats.corpus_errors += 1;
                scan.errors.push(CorpusErrorRecord {
                    source_path: doc.source_path.clone(),
                    line_number: None,
                    document_id: Some(doc.identifier.clone()),
                    message: "duplicate document identifier".to_string(),
                });
                continue;
            }
        }

        let record = matcher.match_normalised(&doc.identifier, &text);
        if record.matched_topic_a {
            scan.stats.topic_a_matched += 1;
        }
        if record.matched_topic_b {
            scan.stats.topic_b_matched += 1;
        }
        if record.is_dual_mention() {
            scan.stats.dual_matched += 1;
            scan.candidates.push(doc);
        }
        scan.records.push(record);
    }

    debug!(
        path = %path.display(),
        documents = scan.stats.documents_read,
        dual = scan.stats.dual_matched,
        "Corpus file scanned"
    );
    scan
}
