//! litscreen-llm: LLM backend abstraction layer.
//! Backends behind the [`backend::LlmBackend`] trait, a factory that builds
//! them from configuration, and the claim classifier the screening stages
//! call.

pub mod audit;
pub mod backend;
pub mod classification;
pub mod router;

pub use audit::LlmAuditEntry;
pub use backend::{LlmBackend, LlmError, LlmRequest, LlmResponse, Message};
pub use classification::{parse_claims, ClaimClassifier, Classification, LlmClaimClassifier};
pub use router::{build_backend, build_registry, BackendConfig, BackendKind, BackendRegistry};
