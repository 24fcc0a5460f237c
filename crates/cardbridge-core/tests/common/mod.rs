//! In-memory stand-ins for the metadata source and the rewrite oracle.

#![allow(dead_code)]

use async_trait::async_trait;
use cardbridge_core::error::{BridgeError, Result};
use cardbridge_core::models::{
    Card, CardDefinition, CardId, ExecutionReport, FieldDescriptor, QueryKind, SchemaCatalog,
    SystemId, TableDescriptor, TableMapping,
};
use cardbridge_core::{
    MappingStore, MemoryStore, MetadataSource, Migrator, MigratorSettings, RewriteOracle,
    SchemaResolver,
};
use cardbridge_core::network::RetryConfig;
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SOURCE_DB: SystemId = 1;
pub const TARGET_DB: SystemId = 2;

/// Fake BI API holding cards in memory.
#[derive(Default)]
pub struct FakeSource {
    cards: Mutex<BTreeMap<CardId, Card>>,
    created: Mutex<BTreeMap<CardId, CardDefinition>>,
    updates: Mutex<Vec<(CardId, CardDefinition)>>,
    execution_errors: Mutex<VecDeque<String>>,
    fetch_delay: Mutex<Option<Duration>>,
    creates_before_failure: Mutex<Option<usize>>,
    fail_updates: AtomicBool,
    next_id: AtomicU32,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU32::new(1000),
            ..Self::default()
        })
    }

    pub fn add_card(&self, card: Card) {
        self.cards.lock().unwrap().insert(card.id, card);
    }

    /// Queue execution errors; each execute call pops one, then runs clean.
    pub fn fail_executions(&self, errors: &[&str]) {
        let mut queue = self.execution_errors.lock().unwrap();
        queue.extend(errors.iter().map(|e| e.to_string()));
    }

    /// Let `succeed` more creates through, then reject every create.
    pub fn fail_creates_after(&self, succeed: usize) {
        *self.creates_before_failure.lock().unwrap() = Some(succeed);
    }

    pub fn fail_updates(&self) {
        self.fail_updates.store(true, Ordering::SeqCst);
    }

    pub fn delay_fetches(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }

    pub fn created(&self) -> BTreeMap<CardId, CardDefinition> {
        self.created.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<(CardId, CardDefinition)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetadataSource for FakeSource {
    async fn get_card(&self, id: CardId) -> Result<Card> {
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.cards
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| BridgeError::NotFound {
                what: format!("card {}", id),
            })
    }

    async fn list_cards(&self, system_id: SystemId) -> Result<Vec<Card>> {
        Ok(self
            .cards
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.source_system_id == system_id)
            .cloned()
            .collect())
    }

    async fn get_schema(&self, system_id: SystemId) -> Result<SchemaCatalog> {
        Ok(match system_id {
            SOURCE_DB => source_catalog(),
            _ => target_catalog(),
        })
    }

    async fn create_object(&self, definition: &CardDefinition) -> Result<CardId> {
        if let Some(remaining) = self.creates_before_failure.lock().unwrap().as_mut() {
            if *remaining == 0 {
                return Err(rejected("card creation"));
            }
            *remaining -= 1;
        }
        let id = CardId::from(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.created.lock().unwrap().insert(id, definition.clone());
        Ok(id)
    }

    async fn update_object(&self, id: CardId, definition: &CardDefinition) -> Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(rejected("card update"));
        }
        self.updates.lock().unwrap().push((id, definition.clone()));
        self.created.lock().unwrap().insert(id, definition.clone());
        Ok(())
    }

    async fn execute(&self, _id: CardId) -> Result<ExecutionReport> {
        let error = self.execution_errors.lock().unwrap().pop_front();
        Ok(ExecutionReport {
            row_count: error.is_none().then_some(1),
            error,
        })
    }
}

fn rejected(what: &str) -> BridgeError {
    BridgeError::Api {
        status: 500,
        message: format!("{} rejected", what),
    }
}

/// Oracle answering from a closure and counting calls.
pub struct ScriptedOracle {
    answer: Box<dyn Fn(&str) -> Result<String> + Send + Sync>,
    calls: AtomicU32,
}

impl ScriptedOracle {
    pub fn new(answer: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            answer: Box::new(answer),
            calls: AtomicU32::new(0),
        })
    }

    /// Fails the test if it is ever called.
    pub fn unused() -> Arc<Self> {
        Self::new(|_| {
            Err(BridgeError::Oracle {
                message: "oracle should not be called".into(),
            })
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RewriteOracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.answer)(prompt)
    }
}

fn field(id: i64, table_id: i64, name: &str) -> FieldDescriptor {
    FieldDescriptor {
        id,
        table_id,
        name: name.to_string(),
        display_name: String::new(),
        base_type: String::new(),
    }
}

fn table(id: i64, schema: &str, name: &str, fields: Vec<FieldDescriptor>) -> TableDescriptor {
    TableDescriptor {
        id,
        schema: Some(schema.to_string()),
        name: name.to_string(),
        display_name: String::new(),
        fields,
    }
}

pub fn source_catalog() -> SchemaCatalog {
    SchemaCatalog {
        system_id: SOURCE_DB,
        tables: vec![
            table(
                10,
                "public",
                "orders",
                vec![
                    field(55, 10, "user_id"),
                    field(56, 10, "created_at"),
                    field(57, 10, "legacy_flag"),
                ],
            ),
            table(11, "public", "users", vec![field(60, 11, "id"), field(61, 11, "email")]),
        ],
    }
}

pub fn target_catalog() -> SchemaCatalog {
    SchemaCatalog {
        system_id: TARGET_DB,
        tables: vec![
            table(200, "default", "orders", vec![field(255, 200, "user_id"), field(256, 200, "created_at")]),
            table(201, "default", "users", vec![field(260, 201, "id"), field(261, 201, "email")]),
        ],
    }
}

pub fn structured_card(id: CardId, body: Value) -> Card {
    Card {
        id,
        name: format!("card {}", id),
        query_kind: QueryKind::Structured,
        query_body: body,
        source_system_id: SOURCE_DB,
        description: None,
        collection_id: Some(7),
        display: "table".into(),
        visualization_settings: json!({}),
    }
}

pub fn raw_card(id: CardId, text: &str) -> Card {
    Card {
        query_kind: QueryKind::Raw,
        query_body: json!({"query": text, "template-tags": {}}),
        ..structured_card(id, Value::Null)
    }
}

/// Everything a test needs to drive a migration.
pub struct Harness {
    pub source: Arc<FakeSource>,
    pub store: Arc<MemoryStore>,
    pub oracle: Arc<ScriptedOracle>,
    pub migrator: Migrator,
}

impl Harness {
    pub fn new(oracle: Arc<ScriptedOracle>) -> Self {
        let source = FakeSource::new();
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_table_mapping(&TableMapping::manual(10, "public.orders", 200, "default.orders"))
            .unwrap();
        store
            .upsert_table_mapping(&TableMapping::manual(11, "public.users", 201, "default.users"))
            .unwrap();

        let resolver = Arc::new(
            SchemaResolver::load(store.clone(), source_catalog(), target_catalog()).unwrap(),
        );
        let settings = MigratorSettings::new(SOURCE_DB, TARGET_DB)
            .with_verify_retry(RetryConfig::immediate(1))
            .with_oracle_retry(RetryConfig::immediate(2));
        let migrator = Migrator::new(
            source.clone(),
            store.clone(),
            resolver,
            oracle.clone(),
            settings,
        );

        Self {
            source,
            store,
            oracle,
            migrator,
        }
    }
}
