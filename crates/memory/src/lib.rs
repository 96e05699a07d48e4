//! Conversation Memory Engine: an embedded per-user knowledge graph
//! (entities, observations, relations) plus a TTL'd conversation ring
//! buffer and a staleness-tracked prose summary.
//!
//! Backed by `sled` as the embedded on-disk store (spec §6: "an on-disk
//! key/value-capable engine"). Schema migration is out of scope, matching
//! the spec's explicit non-goal.

pub mod entity;
pub mod error;
pub mod relation;
pub mod store;
pub mod summary;

pub use entity::{Entity, EntityType};
pub use error::{MemoryError, Result};
pub use relation::Relation;
pub use store::{MemoryEngine, MemorySummaryView};
pub use summary::{StalenessCounter, Summary, DEFAULT_STALENESS_MUTATION_THRESHOLD};
