//! Review ledger sinks.
//!
//! The ledger is where human reviewers colour-code stage-2 survivors. The
//! pipeline only ever appends; tags are edited by people, outside this tool.

use crate::error::Result;
use async_trait::async_trait;
use litscreen_common::ReviewEntry;
use std::collections::HashSet;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

#[async_trait]
pub trait LedgerSink: Send + Sync {
    /// Every entry currently in the ledger.
    async fn entries(&self) -> Result<Vec<ReviewEntry>>;

    async fn append_entries(&self, entries: &[ReviewEntry]) -> Result<()>;

    async fn existing_ids(&self) -> Result<HashSet<String>> {
        Ok(self.entries().await?.into_iter().map(|e| e.document_id).collect())
    }
}

// ── CSV file ─────────────────────────────────────────────────────────────────

/// Ledger stored as a CSV file with a header row
/// (`document_id,extracted_claim,human_tag,exported_at`), suitable for import
/// into a shared spreadsheet.
#[derive(Debug, Clone)]
pub struct CsvLedger {
    path: PathBuf,
}

impl CsvLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Rows of a ledger file. Rows a reviewer left unparseable keep their id so
/// the document is not exported a second time.
#[derive(Debug, Default)]
struct LedgerRows {
    entries: Vec<ReviewEntry>,
    unreadable_ids: Vec<String>,
}

fn read_ledger(path: &Path) -> Result<LedgerRows> {
    let mut rows = LedgerRows::default();
    if !path.exists() {
        return Ok(rows);
    }
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let id_col = headers.iter().position(|h| h.trim() == "document_id").unwrap_or(0);

    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable ledger row");
                continue;
            }
        };
        match record.deserialize::<ReviewEntry>(Some(&headers)) {
            Ok(entry) => rows.entries.push(entry),
            Err(e) => {
                let id = record.get(id_col).map(str::trim).unwrap_or_default();
                warn!(
                    path = %path.display(),
                    line = ?record.position().map(|p| p.line()),
                    document_id = id,
                    error = %e,
                    "Skipping unreadable ledger row"
                );
                if !id.is_empty() {
                    rows.unreadable_ids.push(id.to_string());
                }
            }
        }
    }
    Ok(rows)
}

/// A file saved by a spreadsheet may lack the final newline; appending
/// straight after it would glue the new row onto the last one.
fn ends_with_newline(file: &mut std::fs::File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

#[async_trait]
impl LedgerSink for CsvLedger {
    async fn entries(&self) -> Result<Vec<ReviewEntry>> {
        let path = self.path.clone();
        let rows = tokio::task::spawn_blocking(move || read_ledger(&path)).await??;
        Ok(rows.entries)
    }

    async fn existing_ids(&self) -> Result<HashSet<String>> {
        let path = self.path.clone();
        let rows = tokio::task::spawn_blocking(move || read_ledger(&path)).await??;
        Ok(rows
            .entries
            .into_iter()
            .map(|e| e.document_id)
            .chain(rows.unreadable_ids)
            .collect())
    }

    async fn append_entries(&self, entries: &[ReviewEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let path = self.path.clone();
        let entries = entries.to_vec();
        tokio::task::spawn_blocking(move || -> Result<()> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(&path)?;
            let needs_header = file.metadata()?.len() == 0;
            if !ends_with_newline(&mut file)? {
                file.write_all(b"\n")?;
            }
            let mut writer = csv::WriterBuilder::new()
                .has_headers(needs_header)
                .from_writer(file);
            for entry in &entries {
                writer.serialize(entry)?;
            }
            writer.flush()?;
            tracing::debug!(path = %path.display(), n = entries.len(), "Ledger entries appended");
            Ok(())
        })
        .await?
    }
}

// ── In memory ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    entries: Mutex<Vec<ReviewEntry>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ReviewEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LedgerSink for InMemoryLedger {
    async fn entries(&self) -> Result<Vec<ReviewEntry>> {
        Ok(self.lock().clone())
    }

    async fn append_entries(&self, entries: &[ReviewEntry]) -> Result<()> {
        self.lock().extend_from_slice(entries);
        Ok(())
    }
}
