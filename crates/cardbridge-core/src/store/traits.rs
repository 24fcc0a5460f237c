//! Mapping store trait.

use crate::error::Result;
use crate::models::{CardId, FieldMapping, TableMapping};
use std::collections::BTreeMap;

/// Key-based read/write/upsert contract the engine needs from persistence.
///
/// All operations are synchronous to match rusqlite's API. Implementations
/// must make each upsert atomic per key; that is what makes concurrent
/// migrations of independent cards safe.
pub trait MappingStore: Send + Sync {
    /// All table mappings, in source-id order.
    fn table_mappings(&self) -> Result<Vec<TableMapping>>;

    /// Insert or replace the mapping for `mapping.source_table_id`.
    fn upsert_table_mapping(&self, mapping: &TableMapping) -> Result<()>;

    /// All field mappings, in source-id order.
    fn field_mappings(&self) -> Result<Vec<FieldMapping>>;

    /// Insert or replace the mapping for `mapping.source_field_id`.
    fn upsert_field_mapping(&self, mapping: &FieldMapping) -> Result<()>;

    /// Target card for a migrated source card.
    fn card_id_mapping(&self, source_card_id: CardId) -> Result<Option<CardId>>;

    /// Record `source_card_id` as migrated to `target_card_id`.
    fn set_card_id_mapping(&self, source_card_id: CardId, target_card_id: CardId) -> Result<()>;

    /// Snapshot of every card-id mapping.
    fn card_id_mappings(&self) -> Result<BTreeMap<CardId, CardId>>;

    fn get_state(&self, key: &str) -> Result<Option<String>>;

    fn set_state(&self, key: &str, value: &str) -> Result<()>;

    /// Cached oracle translation for a content hash.
    fn cached_translation(&self, hash: &str) -> Result<Option<String>>;

    /// Store a translation. The first write for a hash wins.
    fn put_cached_translation(&self, hash: &str, text: &str) -> Result<()>;
}
