//! litscreen record store
//!
//! Append-only persistence for everything a screening run produces:
//! keyword match records, the dual-mention candidate documents, per-stage
//! verdicts, corpus read errors and the LLM audit trail. Also hosts the
//! review ledger sinks that stage-2 survivors are exported to.
//!
//! # Example
//!
//! ```rust,no_run
//! use litscreen_db::{JsonlRecordStore, RecordStore};
//! use litscreen_common::ScreeningStage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = JsonlRecordStore::open("./litscreen-work").await?;
//!     let verdicts = store.verdicts(ScreeningStage::One).await?;
//!     println!("{} stage-1 verdicts", verdicts.len());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod ledger;
pub mod store;

pub use error::{DbError, Result};
pub use ledger::{CsvLedger, InMemoryLedger, LedgerSink};
pub use store::{InMemoryRecordStore, JsonlRecordStore, RecordStore};
