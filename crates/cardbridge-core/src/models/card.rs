use super::{CardId, SystemId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a card expresses its query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// Nested expression tree addressing tables and fields by id.
    Structured,
    /// Dialect-specific query text.
    Raw,
}

impl QueryKind {
    /// Whether cards of this kind need dialect translation to move.
    pub fn needs_translation(&self) -> bool {
        matches!(self, QueryKind::Raw)
    }
}

/// A card as read from the metadata source. Never mutated after fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub name: String,
    pub query_kind: QueryKind,
    /// Structured: the query tree. Raw: `{"query": "...", "template-tags": {...}}`.
    pub query_body: Value,
    pub source_system_id: SystemId,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub collection_id: Option<i64>,
    #[serde(default = "default_display")]
    pub display: String,
    #[serde(default)]
    pub visualization_settings: Value,
}

fn default_display() -> String {
    "table".to_string()
}

impl Card {
    /// Query text of a raw card, if present.
    pub fn raw_text(&self) -> Option<&str> {
        self.query_body.get("query").and_then(Value::as_str)
    }

    /// Build the definition of this card's counterpart in the target system.
    pub fn to_definition(
        &self,
        query_body: Value,
        target_system_id: SystemId,
        container_id: Option<i64>,
    ) -> CardDefinition {
        CardDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            query_kind: self.query_kind,
            query_body,
            target_system_id,
            container_id,
            display: self.display.clone(),
            visualization_settings: self.visualization_settings.clone(),
        }
    }
}

/// Payload for creating or updating a card in the target system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardDefinition {
    pub name: String,
    pub description: Option<String>,
    pub query_kind: QueryKind,
    pub query_body: Value,
    pub target_system_id: SystemId,
    pub container_id: Option<i64>,
    pub display: String,
    pub visualization_settings: Value,
}

impl CardDefinition {
    /// Copy of this definition with the raw query text replaced.
    pub fn with_raw_text(&self, text: &str) -> Self {
        let mut def = self.clone();
        if let Value::Object(map) = &mut def.query_body {
            map.insert("query".to_string(), Value::String(text.to_string()));
        }
        def
    }
}

/// Result of running a card once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Error reported by the target system, if the query failed.
    pub error: Option<String>,
    pub row_count: Option<u64>,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}
