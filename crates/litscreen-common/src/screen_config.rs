//! Screening run configuration.
//!
//! Describes where the corpus and keyword lists live, how each LLM stage is
//! prompted, and how hard the pipeline pushes the external services. Loadable
//! from YAML, JSON or TOML, and embedded (flattened) in `litscreen.toml`.

use crate::error::{LitscreenError, Result};
use crate::models::ScreeningStage;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

/// Instruction sent with every first-pass excerpt.
pub const DEFAULT_STAGE1_PROMPT: &str = "\
You are screening web documents for a literature review on classifier evaluation metrics. \
Decide whether the text claims that the area under the precision-recall curve (AUPRC, PR-AUC, \
average precision) should be preferred over the area under the ROC curve (AUROC, ROC-AUC) \
when the positive class is rare, or makes the equivalent claim about AUROC being misleading \
under class imbalance.\n\
Reply with JSON only: {\"claims\": [\"<literal sentence from the text>\", ...]}. \
Quote the text verbatim. Reply {\"claims\": []} if the text makes no such claim.";

/// Instruction sent with every second-pass document.
pub const DEFAULT_STAGE2_PROMPT: &str = "\
You are verifying candidate documents for a literature review on classifier evaluation metrics. \
A document qualifies only if it explicitly states that AUPRC (precision-recall AUC, average \
precision) is better than, more informative than, or preferable to AUROC for imbalanced data. \
Passing mentions of both metrics do not qualify.\n\
Reply with JSON only: {\"claims\": [\"<exact sentence making the claim>\"]}. \
Copy the claim text exactly as written. Reply {\"claims\": []} if the document does not qualify.";

/// Complete screening configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningConfig {
    /// The two topic keyword lists.
    pub keywords: KeywordConfig,

    #[serde(default)]
    pub corpus: CorpusConfig,

    #[serde(default = "StageConfig::stage1_defaults", deserialize_with = "stage1_over_defaults")]
    pub stage1: StageConfig,

    #[serde(default = "StageConfig::stage2_defaults", deserialize_with = "stage2_over_defaults")]
    pub stage2: StageConfig,

    /// Retry policy for classification calls and ledger writes.
    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,
}

// ── Keywords ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordConfig {
    #[serde(default = "default_topic_a_name")]
    pub topic_a_name: String,
    pub topic_a_path: PathBuf,
    #[serde(default = "default_topic_b_name")]
    pub topic_b_name: String,
    pub topic_b_path: PathBuf,
}

fn default_topic_a_name() -> String { "auroc".to_string() }
fn default_topic_b_name() -> String { "auprc".to_string() }

// ── Corpus ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// JSONL files, or directories whose `*.jsonl` / `*.json` files are read.
    #[serde(default)]
    pub paths: Vec<PathBuf>,

    /// Skip documents whose normalised text was already seen in this run.
    #[serde(default = "default_true")]
    pub skip_duplicates: bool,
}

fn default_true() -> bool { true }

impl Default for CorpusConfig {
    fn default() -> Self {
        Self { paths: vec![], skip_duplicates: true }
    }
}

// ── LLM stages ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Name of a configured LLM backend ("openai", "anthropic", ...).
    pub backend: String,

    /// Model override; the backend's default model is used when absent.
    pub model: Option<String>,

    /// Inline instruction prompt.
    pub prompt: Option<String>,

    /// Prompt file; takes precedence over `prompt`.
    pub prompt_path: Option<PathBuf>,

    /// Upper bound on the tokens of text sent per call.
    pub max_excerpt_tokens: usize,

    /// Stage 1 only: screen at most this many excerpts of one document.
    /// Absent means every excerpt. A document cut short by the cap without
    /// a positive excerpt gets an unknown verdict, not a negative one.
    #[serde(default)]
    pub max_excerpts_per_document: Option<usize>,

    pub max_output_tokens: u32,

    #[serde(default)]
    pub temperature: f32,
}

impl StageConfig {
    pub fn stage1_defaults() -> Self {
        Self {
            backend: "openai".to_string(),
            model: Some("gpt-3.5-turbo".to_string()),
            prompt: None,
            prompt_path: None,
            max_excerpt_tokens: 3_000,
            max_excerpts_per_document: None,
            max_output_tokens: 150,
            temperature: 0.0,
        }
    }

    pub fn stage2_defaults() -> Self {
        Self {
            backend: "openai".to_string(),
            model: Some("gpt-4".to_string()),
            prompt: None,
            prompt_path: None,
            max_excerpt_tokens: 6_000,
            max_excerpts_per_document: None,
            max_output_tokens: 300,
            temperature: 0.0,
        }
    }

    /// Prompt text for this stage: file, then inline, then the built-in default.
    pub fn resolve_prompt(&self, stage: ScreeningStage) -> Result<String> {
        if let Some(ref path) = self.prompt_path {
            let text = std::fs::read_to_string(path).map_err(|e| {
                LitscreenError::Config(format!("cannot read prompt file {}: {e}", path.display()))
            })?;
            if text.trim().is_empty() {
                return Err(LitscreenError::Config(format!(
                    "prompt file {} is empty", path.display()
                )));
            }
            return Ok(text);
        }
        if let Some(ref prompt) = self.prompt {
            if !prompt.trim().is_empty() {
                return Ok(prompt.clone());
            }
        }
        Ok(match stage {
            ScreeningStage::One => DEFAULT_STAGE1_PROMPT.to_string(),
            ScreeningStage::Two => DEFAULT_STAGE2_PROMPT.to_string(),
        })
    }
}

/// A stage section as written in a config file: every field optional,
/// missing ones taken from the stage's defaults.
#[derive(Debug, Default, Deserialize)]
struct PartialStageConfig {
    backend: Option<String>,
    model: Option<String>,
    prompt: Option<String>,
    prompt_path: Option<PathBuf>,
    max_excerpt_tokens: Option<usize>,
    max_excerpts_per_document: Option<usize>,
    max_output_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl PartialStageConfig {
    fn over(self, base: StageConfig) -> StageConfig {
        // The default model belongs to the default backend.
        let backend_changed = self.backend.as_ref().is_some_and(|b| *b != base.backend);
        let model = match self.model {
            Some(m) => Some(m),
            None if backend_changed => None,
            None => base.model,
        };
        StageConfig {
            backend: self.backend.unwrap_or(base.backend),
            model,
            prompt: self.prompt.or(base.prompt),
            prompt_path: self.prompt_path.or(base.prompt_path),
            max_excerpt_tokens: self.max_excerpt_tokens.unwrap_or(base.max_excerpt_tokens),
            max_excerpts_per_document: self.max_excerpts_per_document.or(base.max_excerpts_per_document),
            max_output_tokens: self.max_output_tokens.unwrap_or(base.max_output_tokens),
            temperature: self.temperature.unwrap_or(base.temperature),
        }
    }
}

fn stage1_over_defaults<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<StageConfig, D::Error> {
    Ok(PartialStageConfig::deserialize(d)?.over(StageConfig::stage1_defaults()))
}

fn stage2_over_defaults<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<StageConfig, D::Error> {
    Ok(PartialStageConfig::deserialize(d)?.over(StageConfig::stage2_defaults()))
}

// ── Execution ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Documents screened concurrently within a stage.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Directory holding the record store.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

fn default_concurrency() -> usize { 4 }
fn default_request_timeout() -> u64 { 60 }
fn default_work_dir() -> PathBuf { PathBuf::from("./litscreen-work") }

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            request_timeout_secs: default_request_timeout(),
            work_dir: default_work_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// CSV file the review entries are appended to.
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

fn default_ledger_path() -> PathBuf { PathBuf::from("./review_ledger.csv") }

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { path: default_ledger_path() }
    }
}

impl ScreeningConfig {
    /// Load from a YAML, JSON or TOML file, chosen by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
        let config: Self = match ext.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            "toml" => toml::from_str(&content)?,
            other => {
                return Err(LitscreenError::Config(format!(
                    "unsupported config extension '{other}' for {}", path.display()
                )))
            }
        };
        Ok(config)
    }

    pub fn stage(&self, stage: ScreeningStage) -> &StageConfig {
        match stage {
            ScreeningStage::One => &self.stage1,
            ScreeningStage::Two => &self.stage2,
        }
    }

    /// Reject settings that would make a run meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.keywords.topic_a_path.as_os_str().is_empty()
            || self.keywords.topic_b_path.as_os_str().is_empty()
        {
            return Err(LitscreenError::Config("both keyword list paths must be set".into()));
        }
        if self.execution.concurrency == 0 {
            return Err(LitscreenError::Config("execution.concurrency must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(LitscreenError::Config("retry.max_attempts must be at least 1".into()));
        }
        for (name, stage) in [("stage1", &self.stage1), ("stage2", &self.stage2)] {
            if stage.backend.trim().is_empty() {
                return Err(LitscreenError::Config(format!("{name}.backend must be set")));
            }
            if stage.max_excerpt_tokens == 0 || stage.max_excerpts_per_document == Some(0) {
                return Err(LitscreenError::Config(format!(
                    "{name}: excerpt limits must be positive"
                )));
            }
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
