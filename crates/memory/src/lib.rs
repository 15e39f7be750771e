//! Persistent, type-segregated memory for the agent runtime.
//!
//! Five collections (experiences, lessons, strategies, facts, errors) back a
//! semantic-query store with a text-overlap fallback, a deterministic rule
//! engine consulted before any LLM call, a surface-pattern interaction
//! classifier, a context retriever, an error pattern memory, and the
//! housekeeper that enforces age and size limits.

pub mod error_memory;
pub mod filter;
pub mod maintenance;
pub mod retrieval;
pub mod rules;
pub mod schema;
pub mod store;

pub use error_memory::{ActionKind, ErrorMemory, PatternReport, PreflightReport, Remediation, Severity};
pub use filter::{Classification, MemoryFilter};
pub use maintenance::{Housekeeper, SweepReport};
pub use retrieval::{ContextBundle, RetrievalLimits, Retriever};
pub use rules::{RuleEngine, RuleMatch};
pub use schema::{
    ErrorEvent, Experience, Fact, Lesson, MetaValue, Rule, StoredRecord, Strategy, TriggerKind,
};
pub use store::{Collection, MemoryStores};
