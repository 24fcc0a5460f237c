//! Data model shared by the resolver, the rewrite engines and the orchestrator.

mod card;
mod mapping;
mod outcome;
mod schema;

pub use card::{Card, CardDefinition, ExecutionReport, QueryKind};
pub use mapping::{
    FieldMapping, MappingCandidate, MappingMethod, TableMapping, UnmatchedField, UnmatchedTable,
};
pub use outcome::{
    ErrorKind, MigratedCard, MigrationError, MigrationOutcome, MigrationRecord, MigrationResult,
    RecordStatus, Verification,
};
pub use schema::{FieldDescriptor, SchemaCatalog, TableDescriptor};

/// Identifier of a card in the metadata source.
pub type CardId = i64;
/// Identifier of a table in a schema catalog.
pub type TableId = i64;
/// Identifier of a field in a schema catalog.
pub type FieldId = i64;
/// Identifier of a database (data source) in the metadata source.
pub type SystemId = i64;
