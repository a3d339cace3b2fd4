//! litscreen-pipeline: Stage orchestration.
//! Runs the keyword filter, the two LLM screening stages and the review
//! ledger export against a record store, and summarises the results.

pub mod export;
pub mod pipeline;
pub mod screening;
pub mod summary;

pub use export::{export_survivors, ExportReport};
pub use pipeline::Pipeline;
pub use screening::{run_stage, StageReport, StageSettings};
pub use summary::RunSummary;
