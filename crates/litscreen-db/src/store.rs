//! Record store.
//!
//! The filter stage replaces its outputs wholesale (a new filter run is a new
//! pipeline run). Verdicts are append-only; when a document is screened
//! again, the most recent line wins.

use crate::error::Result;
use async_trait::async_trait;
use litscreen_common::{
    CorpusErrorRecord, Document, FilterStats, MatchRecord, ScreeningStage, ScreeningVerdict,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::io::SeekFrom;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

pub const MATCH_RECORDS_FILE: &str = "match_records.jsonl";
pub const CANDIDATES_FILE: &str = "candidates.jsonl";
pub const CORPUS_ERRORS_FILE: &str = "corpus_errors.jsonl";
pub const AUDIT_FILE: &str = "llm_audit.jsonl";
pub const FILTER_STATS_FILE: &str = "filter_stats.json";

pub fn verdicts_file(stage: ScreeningStage) -> String {
    format!("verdicts_stage{}.jsonl", stage.number())
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Replace the keyword filter output of a previous run.
    async fn replace_filter_output(
        &self,
        records: &[MatchRecord],
        candidates: &[Document],
        errors: &[CorpusErrorRecord],
        stats: &FilterStats,
    ) -> Result<()>;

    /// Counters of the last completed filter run, if any.
    async fn filter_stats(&self) -> Result<Option<FilterStats>>;

    async fn match_records(&self) -> Result<Vec<MatchRecord>>;

    /// Dual-mention documents kept by the filter, with their text.
    async fn candidates(&self) -> Result<Vec<Document>>;

    async fn corpus_errors(&self) -> Result<Vec<CorpusErrorRecord>>;

    async fn append_verdict(&self, verdict: &ScreeningVerdict) -> Result<()>;

    /// Latest verdict per document, in first-screened order.
    async fn verdicts(&self, stage: ScreeningStage) -> Result<Vec<ScreeningVerdict>>;

    async fn append_audit(&self, entry: &serde_json::Value) -> Result<()>;
}

fn latest_per_document(all: Vec<ScreeningVerdict>) -> Vec<ScreeningVerdict> {
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<ScreeningVerdict> = Vec::new();
    for v in all {
        match position.get(&v.document_id) {
            Some(&i) => out[i] = v,
            None => {
                position.insert(v.document_id.clone(), out.len());
                out.push(v);
            }
        }
    }
    out
}

// ── JSONL files ──────────────────────────────────────────────────────────────

/// One JSON document per line, one file per record type, under `dir`.
pub struct JsonlRecordStore {
    dir: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlRecordStore {
    /// Open or create a store in the given directory.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        debug!(dir = %dir.display(), "Record store opened");
        Ok(Self { dir, write_lock: tokio::sync::Mutex::new(()) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn encode<T: Serialize>(items: &[T]) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        for item in items {
            serde_json::to_writer(&mut buf, item)?;
            buf.push(b'\n');
        }
        Ok(buf)
    }

    async fn append_lines<T: Serialize>(&self, file: &str, items: &[T]) -> Result<()> {
        let mut buf = Self::encode(items)?;
        let _guard = self.write_lock.lock().await;
        let mut f = tokio::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(self.dir.join(file))
            .await?;
        // A run killed mid-write leaves a partial last line; start a fresh one.
        if f.metadata().await?.len() > 0 {
            let mut last = [0u8; 1];
            f.seek(SeekFrom::End(-1)).await?;
            f.read_exact(&mut last).await?;
            if last[0] != b'\n' {
                buf.insert(0, b'\n');
            }
        }
        f.write_all(&buf).await?;
        f.flush().await?;
        Ok(())
    }

    async fn replace_lines<T: Serialize>(&self, file: &str, items: &[T]) -> Result<()> {
        let buf = Self::encode(items)?;
        let _guard = self.write_lock.lock().await;
        let tmp = self.dir.join(format!("{file}.tmp"));
        tokio::fs::write(&tmp, &buf).await?;
        tokio::fs::rename(&tmp, self.dir.join(file)).await?;
        Ok(())
    }

    /// Missing files read as empty. Lines that fail to parse (a run killed
    /// mid-write) are skipped.
    async fn read_lines<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>> {
        let path = self.dir.join(file);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        for (i, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(item) => out.push(item),
                Err(e) => warn!(file, line = i + 1, error = %e, "Skipping unreadable record"),
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl RecordStore for JsonlRecordStore {
    async fn replace_filter_output(
        &self,
        records: &[MatchRecord],
        candidates: &[Document],
        errors: &[CorpusErrorRecord],
        stats: &FilterStats,
    ) -> Result<()> {
        self.replace_lines(MATCH_RECORDS_FILE, records).await?;
        self.replace_lines(CANDIDATES_FILE, candidates).await?;
        self.replace_lines(CORPUS_ERRORS_FILE, errors).await?;
        // Written last: its presence marks a complete filter output.
        self.replace_lines(FILTER_STATS_FILE, std::slice::from_ref(stats)).await?;
        Ok(())
    }

    async fn filter_stats(&self) -> Result<Option<FilterStats>> {
        Ok(self.read_lines(FILTER_STATS_FILE).await?.into_iter().next())
    }

    async fn match_records(&self) -> Result<Vec<MatchRecord>> {
        self.read_lines(MATCH_RECORDS_FILE).await
    }

    async fn candidates(&self) -> Result<Vec<Document>> {
        self.read_lines(CANDIDATES_FILE).await
    }

    async fn corpus_errors(&self) -> Result<Vec<CorpusErrorRecord>> {
        self.read_lines(CORPUS_ERRORS_FILE).await
    }

    async fn append_verdict(&self, verdict: &ScreeningVerdict) -> Result<()> {
        self.append_lines(&verdicts_file(verdict.stage), std::slice::from_ref(verdict)).await
    }

    async fn verdicts(&self, stage: ScreeningStage) -> Result<Vec<ScreeningVerdict>> {
        let all = self.read_lines(&verdicts_file(stage)).await?;
        Ok(latest_per_document(all))
    }

    async fn append_audit(&self, entry: &serde_json::Value) -> Result<()> {
        self.append_lines(AUDIT_FILE, std::slice::from_ref(entry)).await
    }
}

// ── In memory ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryTables {
    records: Vec<MatchRecord>,
    candidates: Vec<Document>,
    errors: Vec<CorpusErrorRecord>,
    stats: Option<FilterStats>,
    verdicts: Vec<ScreeningVerdict>,
    audit: Vec<serde_json::Value>,
}

/// Volatile store, used by tests and dry runs.
#[derive(Default)]
pub struct InMemoryRecordStore {
    tables: Mutex<MemoryTables>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn audit_entries(&self) -> Vec<serde_json::Value> {
        self.lock().audit.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryTables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn replace_filter_output(
        &self,
        records: &[MatchRecord],
        candidates: &[Document],
        errors: &[CorpusErrorRecord],
        stats: &FilterStats,
    ) -> Result<()> {
        let mut t = self.lock();
        t.records = records.to_vec();
        t.candidates = candidates.to_vec();
        t.errors = errors.to_vec();
        t.stats = Some(stats.clone());
        Ok(())
    }

    async fn filter_stats(&self) -> Result<Option<FilterStats>> {
        Ok(self.lock().stats.clone())
    }

    async fn match_records(&self) -> Result<Vec<MatchRecord>> {
        Ok(self.lock().records.clone())
    }

    async fn candidates(&self) -> Result<Vec<Document>> {
        Ok(self.lock().candidates.clone())
    }

    async fn corpus_errors(&self) -> Result<Vec<CorpusErrorRecord>> {
        Ok(self.lock().errors.clone())
    }

    async fn append_verdict(&self, verdict: &ScreeningVerdict) -> Result<()> {
        self.lock().verdicts.push(verdict.clone());
        Ok(())
    }

    async fn verdicts(&self, stage: ScreeningStage) -> Result<Vec<ScreeningVerdict>> {
        let all = self.lock().verdicts.iter().filter(|v| v.stage == stage).cloned().collect();
        Ok(latest_per_document(all))
    }

    async fn append_audit(&self, entry: &serde_json::Value) -> Result<()> {
        self.lock().audit.push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use litscreen_common::Verdict;

    fn verdict(id: &str, stage: ScreeningStage, v: Verdict) -> ScreeningVerdict {
        ScreeningVerdict {
            document_id: id.to_string(),
            stage,
            model_name: "test-model".to_string(),
            verdict: v,
            extracted_claim: None,
            claims: vec![],
            attempts: 1,
            excerpt_index: None,
            error: None,
            screened_at: Utc::now(),
        }
    }

    #[test]
    fn test_latest_verdict_wins_and_order_is_kept() {
        let all = vec![
            verdict("a", ScreeningStage::One, Verdict::Unknown),
            verdict("b", ScreeningStage::One, Verdict::Negative),
            verdict("a", ScreeningStage::One, Verdict::Positive),
        ];
        let latest = latest_per_document(all);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].document_id, "a");
        assert_eq!(latest[0].verdict, Verdict::Positive);
        assert_eq!(latest[1].document_id, "b");
    }

    #[tokio::test]
    async fn test_in_memory_verdicts_are_per_stage() {
        let store = InMemoryRecordStore::new();
        store.append_verdict(&verdict("a", ScreeningStage::One, Verdict::Positive)).await.unwrap();
        store.append_verdict(&verdict("a", ScreeningStage::Two, Verdict::Negative)).await.unwrap();
        assert_eq!(store.verdicts(ScreeningStage::One).await.unwrap().len(), 1);
        let two = store.verdicts(ScreeningStage::Two).await.unwrap();
        assert_eq!(two[0].verdict, Verdict::Negative);
    }
}
