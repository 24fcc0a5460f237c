//! Cardbridge Core - dependency-aware migration of report cards between
//! databases that speak different SQL dialects.
//!
//! A card is either a structured query (a tree of table and field ids) or raw
//! query text. Moving it to another database means remapping every id,
//! translating the text, and moving every card it reads from first. This
//! crate does that against a metadata source, keeping its progress in a
//! mapping store so repeated runs are idempotent.
//!
//! # Example
//!
//! ```rust,ignore
//! use cardbridge_core::{
//!     ChatCompletionsOracle, MetabaseClient, MigrateOptions, Migrator, MigratorSettings,
//!     MetadataSource, SchemaResolver, SqliteStore,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> cardbridge_core::Result<()> {
//!     let source = Arc::new(MetabaseClient::new("https://bi.example.com", "mb_key")?);
//!     let store = Arc::new(SqliteStore::open("cardbridge.db")?);
//!     let oracle = Arc::new(ChatCompletionsOracle::new(
//!         "https://llm.example.com/v1/chat/completions",
//!         Some("llm_key".into()),
//!     )?);
//!
//!     let settings = MigratorSettings::new(1, 2);
//!     let resolver = Arc::new(SchemaResolver::load(
//!         store.clone(),
//!         source.get_schema(1).await?,
//!         source.get_schema(2).await?,
//!     )?);
//!
//!     let migrator = Migrator::new(source, store, resolver, oracle, settings);
//!     match migrator.migrate(100, &MigrateOptions::default()).await {
//!         Ok(card) => println!("{:?}", card.outcome),
//!         Err(e) => eprintln!("{}", e),
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod models;
pub mod network;
pub mod oracle;
pub mod orchestrator;
pub mod resolver;
pub mod rewrite;
pub mod source;
pub mod store;

// Re-export commonly used types
pub use config::{Dialect, MigratorSettings};
pub use error::{BridgeError, Result};
pub use graph::DependencyGraph;
pub use models::{
    Card, CardDefinition, CardId, ErrorKind, MigratedCard, MigrationError, MigrationOutcome,
    MigrationRecord, MigrationResult, QueryKind, RecordStatus, SchemaCatalog, Verification,
};
pub use oracle::{ChatCompletionsOracle, RewriteOracle};
pub use orchestrator::{
    BatchOptions, BatchReport, CardState, CardStatus, HoldReason, MigrateOptions, Migrator,
};
pub use resolver::SchemaResolver;
pub use source::{MetabaseClient, MetadataSource};
pub use store::{MappingStore, MemoryStore, SqliteStore};
