//! SQLite-backed mapping store.

use super::traits::MappingStore;
use crate::error::{BridgeError, Result};
use crate::models::{CardId, FieldMapping, TableMapping};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Mapping store persisted in a single SQLite database.
///
/// Mapping rows keep their full record as a JSON payload next to the key
/// columns. Thread-safe via an internal mutex on the connection; each upsert
/// is a single `ON CONFLICT` statement, so writes are atomic per key.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

fn db_error(context: &'static str) -> impl FnOnce(rusqlite::Error) -> BridgeError {
    move |e| BridgeError::Database {
        message: format!("{}: {}", context, e),
        source: Some(e),
    }
}

impl SqliteStore {
    /// Open (or create) the store at `db_path`.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| BridgeError::io_with_path(e, parent))?;
            }
        }

        let conn = Connection::open(db_path).map_err(db_error("Failed to open mapping store"))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_error("Failed to set pragmas"))?;

        Self::with_connection(conn)
    }

    /// A throwaway store that lives only as long as the value.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_error("Failed to open mapping store"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| BridgeError::database(format!("Failed to lock database: {}", e)))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS table_mappings (
                source_table_id INTEGER PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS field_mappings (
                source_field_id INTEGER PRIMARY KEY,
                source_table_id INTEGER NOT NULL,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_field_mappings_table
                ON field_mappings(source_table_id);

            -- One row per migrated source card
            CREATE TABLE IF NOT EXISTS card_id_mappings (
                source_card_id INTEGER PRIMARY KEY,
                target_card_id INTEGER NOT NULL,
                migrated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kv_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS translation_cache (
                hash TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                cached_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(db_error("Failed to initialize mapping store schema"))?;

        Ok(())
    }

    fn load_payloads<T: serde::de::DeserializeOwned>(&self, sql: &str) -> Result<Vec<T>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(db_error("Failed to prepare mapping query"))?;
        let payloads = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_error("Failed to query mappings"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_error("Failed to read mapping row"))?;

        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(BridgeError::from))
            .collect()
    }
}

impl MappingStore for SqliteStore {
    fn table_mappings(&self) -> Result<Vec<TableMapping>> {
        self.load_payloads("SELECT payload FROM table_mappings ORDER BY source_table_id")
    }

    fn upsert_table_mapping(&self, mapping: &TableMapping) -> Result<()> {
        let payload = serde_json::to_string(mapping)?;
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO table_mappings (source_table_id, payload, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(source_table_id) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
            params![mapping.source_table_id, payload, Utc::now().to_rfc3339()],
        )
        .map_err(db_error("Failed to upsert table mapping"))?;
        Ok(())
    }

    fn field_mappings(&self) -> Result<Vec<FieldMapping>> {
        self.load_payloads("SELECT payload FROM field_mappings ORDER BY source_field_id")
    }

    fn upsert_field_mapping(&self, mapping: &FieldMapping) -> Result<()> {
        let payload = serde_json::to_string(mapping)?;
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO field_mappings (source_field_id, source_table_id, payload, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(source_field_id) DO UPDATE SET
                source_table_id = excluded.source_table_id,
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
            params![
                mapping.source_field_id,
                mapping.source_table_id,
                payload,
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(db_error("Failed to upsert field mapping"))?;
        Ok(())
    }

    fn card_id_mapping(&self, source_card_id: CardId) -> Result<Option<CardId>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT target_card_id FROM card_id_mappings WHERE source_card_id = ?1",
            params![source_card_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_error("Failed to read card mapping"))
    }

    fn set_card_id_mapping(&self, source_card_id: CardId, target_card_id: CardId) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO card_id_mappings (source_card_id, target_card_id, migrated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(source_card_id) DO UPDATE SET
                target_card_id = excluded.target_card_id,
                migrated_at = excluded.migrated_at
            "#,
            params![source_card_id, target_card_id, Utc::now().to_rfc3339()],
        )
        .map_err(db_error("Failed to write card mapping"))?;
        debug!("Recorded card mapping {} -> {}", source_card_id, target_card_id);
        Ok(())
    }

    fn card_id_mappings(&self) -> Result<BTreeMap<CardId, CardId>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT source_card_id, target_card_id FROM card_id_mappings")
            .map_err(db_error("Failed to prepare card mapping query"))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(db_error("Failed to query card mappings"))?
            .collect::<std::result::Result<BTreeMap<_, _>, _>>()
            .map_err(db_error("Failed to read card mapping row"))?;
        Ok(rows)
    }

    fn get_state(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT value FROM kv_state WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_error("Failed to read state"))
    }

    fn set_state(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO kv_state (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![key, value, Utc::now().to_rfc3339()],
        )
        .map_err(db_error("Failed to write state"))?;
        Ok(())
    }

    fn cached_translation(&self, hash: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT text FROM translation_cache WHERE hash = ?1",
            params![hash],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_error("Failed to read translation cache"))
    }

    fn put_cached_translation(&self, hash: &str, text: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO translation_cache (hash, text, cached_at) VALUES (?1, ?2, ?3)",
            params![hash, text, Utc::now().to_rfc3339()],
        )
        .map_err(db_error("Failed to write translation cache"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MappingMethod;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, SqliteStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::open(temp_dir.path().join("state/mappings.sqlite")).unwrap();
        (temp_dir, store)
    }

    fn field_mapping(source: i64, target: i64) -> FieldMapping {
        FieldMapping {
            source_field_id: source,
            source_field_name: "cust_id".into(),
            source_table_id: 10,
            target_table_id: Some(200),
            suggested_target_field_id: Some(target),
            suggested_target_field_name: Some("customer_id".into()),
            confidence: 0.92,
            alternatives: vec![],
            confirmed: false,
            final_target_field_id: None,
            ignored: false,
            method: MappingMethod::Heuristic,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_table_mapping_upsert_replaces() {
        let (_temp, store) = create_test_store();

        let mut mapping = TableMapping::manual(10, "public.orders", 200, "default.orders");
        store.upsert_table_mapping(&mapping).unwrap();
        mapping.final_target_table_id = Some(201);
        store.upsert_table_mapping(&mapping).unwrap();

        let all = store.table_mappings().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].confirmed_target(), Some(201));
    }

    #[test]
    fn test_field_mappings_ordered_by_source() {
        let (_temp, store) = create_test_store();

        store.upsert_field_mapping(&field_mapping(56, 211)).unwrap();
        store.upsert_field_mapping(&field_mapping(55, 210)).unwrap();

        let ids: Vec<i64> = store
            .field_mappings()
            .unwrap()
            .iter()
            .map(|m| m.source_field_id)
            .collect();
        assert_eq!(ids, vec![55, 56]);
    }

    #[test]
    fn test_card_mapping_single_entry_per_source() {
        let (_temp, store) = create_test_store();

        store.set_card_id_mapping(99, 1099).unwrap();
        store.set_card_id_mapping(99, 1099).unwrap();
        store.set_card_id_mapping(100, 1100).unwrap();

        let all = store.card_id_mappings().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(store.card_id_mapping(99).unwrap(), Some(1099));
        assert_eq!(store.card_id_mapping(7).unwrap(), None);
    }

    #[test]
    fn test_translation_cache_is_write_once() {
        let (_temp, store) = create_test_store();

        store.put_cached_translation("abc", "SELECT 1").unwrap();
        store.put_cached_translation("abc", "SELECT 2").unwrap();

        assert_eq!(
            store.cached_translation("abc").unwrap().as_deref(),
            Some("SELECT 1")
        );
        assert!(store.cached_translation("missing").unwrap().is_none());
    }

    #[test]
    fn test_state_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("mappings.sqlite");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.set_state("migration:5", "{\"status\":\"migrated\"}").unwrap();
            store.set_card_id_mapping(5, 50).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(
            store.get_state("migration:5").unwrap().as_deref(),
            Some("{\"status\":\"migrated\"}")
        );
        assert_eq!(store.card_id_mapping(5).unwrap(), Some(50));
    }

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set_state("k", "v").unwrap();
        assert_eq!(store.get_state("k").unwrap().as_deref(), Some("v"));
    }
}
