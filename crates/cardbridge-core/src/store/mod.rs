//! Persistent mapping store.
//!
//! Holds table/field correspondences, the card-id mapping that marks cards as
//! migrated, free-form keyed state, and the translation cache. Every write is
//! an upsert keyed on the natural source id, so re-running a migration never
//! duplicates entries.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::MappingStore;
