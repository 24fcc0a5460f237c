//! In-process mapping store.

use super::traits::MappingStore;
use crate::error::{BridgeError, Result};
use crate::models::{CardId, FieldId, FieldMapping, TableId, TableMapping};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Inner {
    tables: BTreeMap<TableId, TableMapping>,
    fields: BTreeMap<FieldId, FieldMapping>,
    cards: BTreeMap<CardId, CardId>,
    state: HashMap<String, String>,
    translations: HashMap<String, String>,
}

/// Mapping store backed by in-memory maps.
///
/// Useful for dry runs and tests; nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|e| BridgeError::database(format!("Memory store lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|e| BridgeError::database(format!("Memory store lock poisoned: {}", e)))
    }
}

impl MappingStore for MemoryStore {
    fn table_mappings(&self) -> Result<Vec<TableMapping>> {
        Ok(self.read()?.tables.values().cloned().collect())
    }

    fn upsert_table_mapping(&self, mapping: &TableMapping) -> Result<()> {
        self.write()?
            .tables
            .insert(mapping.source_table_id, mapping.clone());
        Ok(())
    }

    fn field_mappings(&self) -> Result<Vec<FieldMapping>> {
        Ok(self.read()?.fields.values().cloned().collect())
    }

    fn upsert_field_mapping(&self, mapping: &FieldMapping) -> Result<()> {
        self.write()?
            .fields
            .insert(mapping.source_field_id, mapping.clone());
        Ok(())
    }

    fn card_id_mapping(&self, source_card_id: CardId) -> Result<Option<CardId>> {
        Ok(self.read()?.cards.get(&source_card_id).copied())
    }

    fn set_card_id_mapping(&self, source_card_id: CardId, target_card_id: CardId) -> Result<()> {
        self.write()?.cards.insert(source_card_id, target_card_id);
        Ok(())
    }

    fn card_id_mappings(&self) -> Result<BTreeMap<CardId, CardId>> {
        Ok(self.read()?.cards.clone())
    }

    fn get_state(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read()?.state.get(key).cloned())
    }

    fn set_state(&self, key: &str, value: &str) -> Result<()> {
        self.write()?
            .state
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn cached_translation(&self, hash: &str) -> Result<Option<String>> {
        Ok(self.read()?.translations.get(hash).cloned())
    }

    fn put_cached_translation(&self, hash: &str, text: &str) -> Result<()> {
        self.write()?
            .translations
            .entry(hash.to_string())
            .or_insert_with(|| text.to_string());
        Ok(())
    }
}
