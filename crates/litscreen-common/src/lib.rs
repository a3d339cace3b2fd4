//! litscreen-common: Shared types, errors, and configuration used across all litscreen crates.

pub mod error;
pub mod models;
pub mod retry;
pub mod screen_config;

// Re-export commonly used types
pub use error::{LitscreenError, Result};
pub use models::{
    CorpusErrorRecord, Document, FilterStats, HumanTag, MatchRecord, ReviewEntry, ScreeningStage,
    ScreeningVerdict, Topic, Verdict,
};
pub use retry::{RetryOutcome, RetryPolicy, Transient};
pub use screen_config::{ScreeningConfig, StageConfig};
