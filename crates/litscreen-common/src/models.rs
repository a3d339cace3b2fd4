//! Record types passed between pipeline stages.
//!
//! Each stage owns the record type it produces; downstream stages only join
//! on `document_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// A corpus document. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub identifier: String,
    pub raw_text: String,
    pub source_path: String,
}

/// Which keyword set a term belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    A,
    B,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::A => "A",
            Topic::B => "B",
        }
    }
}

/// Keyword filter output, one per document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub document_id: String,
    pub matched_topic_a: bool,
    pub matched_topic_b: bool,
    /// Normalised topic A terms found in the text.
    #[serde(default)]
    pub terms_a: Vec<String>,
    /// Normalised topic B terms found in the text.
    #[serde(default)]
    pub terms_b: Vec<String>,
}

impl MatchRecord {
    pub fn is_dual_mention(&self) -> bool {
        self.matched_topic_a && self.matched_topic_b
    }
}

/// A corpus line or file that could not be turned into a [`Document`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusErrorRecord {
    pub source_path: String,
    /// 1-based; `None` when the whole file was unreadable.
    pub line_number: Option<usize>,
    pub document_id: Option<String>,
    pub message: String,
}

impl CorpusErrorRecord {
    pub fn location(&self) -> String {
        match self.line_number {
            Some(n) => format!("{}:{}", self.source_path, n),
            None => self.source_path.clone(),
        }
    }
}

/// Counters produced by one keyword filter run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterStats {
    pub files_read: usize,
    pub documents_read: usize,
    pub duplicates_skipped: usize,
    pub corpus_errors: usize,
    pub topic_a_matched: usize,
    pub topic_b_matched: usize,
    pub dual_matched: usize,
}

impl FilterStats {
    pub fn absorb(&mut self, other: &FilterStats) {
        self.files_read += other.files_read;
        self.documents_read += other.documents_read;
        self.duplicates_skipped += other.duplicates_skipped;
        self.corpus_errors += other.corpus_errors;
        self.topic_a_matched += other.topic_a_matched;
        self.topic_b_matched += other.topic_b_matched;
        self.dual_matched += other.dual_matched;
    }
}

// ── Screening ────────────────────────────────────────────────────────────────

/// LLM screening round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ScreeningStage {
    One,
    Two,
}

impl ScreeningStage {
    pub fn number(&self) -> u8 {
        match self {
            ScreeningStage::One => 1,
            ScreeningStage::Two => 2,
        }
    }
}

impl TryFrom<u8> for ScreeningStage {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ScreeningStage::One),
            2 => Ok(ScreeningStage::Two),
            other => Err(format!("unknown screening stage {other} (expected 1 or 2)")),
        }
    }
}

impl From<ScreeningStage> for u8 {
    fn from(stage: ScreeningStage) -> u8 {
        stage.number()
    }
}

impl fmt::Display for ScreeningStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {}", self.number())
    }
}

/// Tri-state screening outcome. `Unknown` means the service could not be
/// consulted and is never treated as a negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "true")]
    Positive,
    #[serde(rename = "false")]
    Negative,
    #[serde(rename = "unknown")]
    Unknown,
}

impl Verdict {
    pub fn from_bool(value: bool) -> Self {
        if value { Verdict::Positive } else { Verdict::Negative }
    }

    /// True/false verdicts are final for a run; unknown ones are retried.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Verdict::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Positive => "true",
            Verdict::Negative => "false",
            Verdict::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningVerdict {
    pub document_id: String,
    pub stage: ScreeningStage,
    pub model_name: String,
    pub verdict: Verdict,
    pub extracted_claim: Option<String>,
    #[serde(default)]
    pub claims: Vec<String>,
    /// Service calls made for this document, retries included.
    pub attempts: u32,
    /// Index of the excerpt that produced the positive verdict.
    pub excerpt_index: Option<usize>,
    pub error: Option<String>,
    pub screened_at: DateTime<Utc>,
}

impl ScreeningVerdict {
    pub fn is_positive(&self) -> bool {
        self.verdict == Verdict::Positive
    }
}

// ── Review ledger ────────────────────────────────────────────────────────────

/// Colour code assigned by a human reviewer.
///
/// Reviewers edit the ledger by hand, so reading is lenient: case and
/// surrounding whitespace are ignored and an empty cell means `Unset`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HumanTag {
    Green,
    Red,
    #[default]
    Unset,
}

impl FromStr for HumanTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "green" => Ok(HumanTag::Green),
            "red" => Ok(HumanTag::Red),
            "" | "unset" => Ok(HumanTag::Unset),
            other => Err(format!("unknown human tag '{other}' (expected green, red or empty)")),
        }
    }
}

impl<'de> Deserialize<'de> for HumanTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub document_id: String,
    pub extracted_claim: String,
    #[serde(default)]
    pub human_tag: HumanTag,
    pub exported_at: DateTime<Utc>,
}

impl ReviewEntry {
    pub fn new(document_id: impl Into<String>, extracted_claim: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            extracted_claim: extracted_claim.into(),
            human_tag: HumanTag::Unset,
            exported_at: Utc::now(),
        }
    }
}
