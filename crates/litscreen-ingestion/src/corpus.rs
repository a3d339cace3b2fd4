//! JSON-Lines corpus reader.
//!
//! Each non-blank line is an object with at least a `text` string. The
//! document identifier is the line's `id` (string or number), else its `url`,
//! else `<source path>:<line number>`.

use anyhow::Context;
use litscreen_common::{CorpusErrorRecord, Document};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct CorpusLine {
    text: Option<serde_json::Value>,
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    url: Option<String>,
}

/// A set of corpus files and directories.
#[derive(Debug, Clone)]
pub struct JsonlCorpus {
    paths: Vec<PathBuf>,
}

impl JsonlCorpus {
    pub fn new(paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self { paths: paths.into_iter().map(Into::into).collect() }
    }

    /// Concrete files to read, in a stable order. Directories contribute their
    /// `*.jsonl` and `*.json` entries (non-recursive, sorted by name).
    pub fn files(&self) -> anyhow::Result<Vec<PathBuf>> {
        if self.paths.is_empty() {
            anyhow::bail!("no corpus paths configured");
        }
        let mut files = Vec::new();
        for path in &self.paths {
            if path.is_dir() {
                let mut entries: Vec<PathBuf> = std::fs::read_dir(path)
                    .with_context(|| format!("listing corpus directory {}", path.display()))?
                    .filter_map(|e| e.ok().map(|e| e.path()))
                    .filter(|p| p.is_file() && is_corpus_file(p))
                    .collect();
                entries.sort();
                files.extend(entries);
            } else if path.exists() {
                files.push(path.clone());
            } else {
                anyhow::bail!("corpus path not found: {}", path.display());
            }
        }
        Ok(files)
    }
}

fn is_corpus_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("jsonl") | Some("json") | Some("ndjson")
    )
}

/// Open a corpus file. An unreadable file becomes a single error record.
pub fn read_documents(path: &Path) -> Result<JsonlDocuments<BufReader<File>>, CorpusErrorRecord> {
    let source_path = path.display().to_string();
    match File::open(path) {
        Ok(f) => Ok(JsonlDocuments::new(BufReader::new(f), source_path)),
        Err(e) => Err(CorpusErrorRecord {
            source_path,
            line_number: None,
            document_id: None,
            message: format!("cannot open file: {e}"),
        }),
    }
}

/// Streaming iterator over the documents of one JSONL source.
pub struct JsonlDocuments<R> {
    reader: R,
    source_path: String,
    line_number: usize,
    buf: Vec<u8>,
    finished: bool,
}

impl<R: BufRead> JsonlDocuments<R> {
    pub fn new(reader: R, source_path: impl Into<String>) -> Self {
        Self {
            reader,
            source_path: source_path.into(),
            line_number: 0,
            buf: Vec::new(),
            finished: false,
        }
    }

    fn error(&self, document_id: Option<String>, message: String) -> CorpusErrorRecord {
        CorpusErrorRecord {
            source_path: self.source_path.clone(),
            line_number: Some(self.line_number),
            document_id,
            message,
        }
    }
}

impl<R: BufRead> Iterator for JsonlDocuments<R> {
    type Item = Result<Document, CorpusErrorRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            self.buf.clear();
            self.line_number += 1;
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.finished = true;
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    // The underlying reader is broken; report once and stop.
                    self.finished = true;
                    return Some(Err(self.error(None, format!("read failed: {e}"))));
                }
            }

            let line = match std::str::from_utf8(&self.buf) {
                Ok(l) => l.trim(),
                Err(e) => return Some(Err(self.error(None, format!("invalid UTF-8: {e}")))),
            };
            if line.is_empty() {
                continue;
            }
            return Some(parse_line(line, &self.source_path, self.line_number));
        }
        None
    }
}

/// Turn one JSONL line into a document.
pub fn parse_line(
    line: &str,
    source_path: &str,
    line_number: usize,
) -> Result<Document, CorpusErrorRecord> {
    let err = |document_id: Option<String>, message: String| CorpusErrorRecord {
        source_path: source_path.to_string(),
        line_number: Some(line_number),
        document_id,
        message,
    };

    let parsed: CorpusLine = serde_json::from_str(line)
        .map_err(|e| err(None, format!("malformed JSON: {e}")))?;

    let identifier = match parsed.id {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s,
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => parsed
            .url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| format!("{source_path}:{line_number}")),
    };

    match parsed.text {
        Some(serde_json::Value::String(raw_text)) => Ok(Document {
            identifier,
            raw_text,
            source_path: source_path.to_string(),
        }),
        Some(_) => Err(err(Some(identifier), "`text` is not a string".to_string())),
        None => Err(err(Some(identifier), "missing `text` field".to_string())),
    }
}
