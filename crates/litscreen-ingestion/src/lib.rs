//! litscreen-ingestion: Corpus reading and keyword filtering.
//! Covers the deterministic front half of the pipeline:
//! - JSONL corpus reading with per-line error capture
//! - Keyword list loading and normalisation
//! - Whole-word, case-insensitive topic matching
//! - Dual-mention selection
//! - Exact-duplicate detection
//! - Excerpt windows for the LLM stages

pub mod chunker;
pub mod corpus;
pub mod dedup;
pub mod filter;
pub mod keywords;
pub mod matcher;
pub mod selector;

pub use corpus::JsonlCorpus;
pub use filter::{run_keyword_filter, FilterOutcome};
pub use keywords::KeywordSet;
pub use matcher::KeywordMatcher;
pub use selector::select_dual_mentions;
