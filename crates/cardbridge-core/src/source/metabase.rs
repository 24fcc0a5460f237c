//! Metabase REST client.
//!
//! Cards come from `/api/card`, schemas from `/api/database/:id/metadata`,
//! and verification runs through `/api/card/:id/query`. Authentication uses
//! an API key header.

use super::MetadataSource;
use crate::config::NetworkConfig;
use crate::error::{BridgeError, Result};
use crate::models::{
    Card, CardDefinition, CardId, ExecutionReport, FieldDescriptor, QueryKind, SchemaCatalog,
    SystemId, TableDescriptor,
};
use crate::network::HttpClient;
use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Client for one Metabase instance.
#[derive(Clone)]
pub struct MetabaseClient {
    http: HttpClient,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for MetabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetabaseClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl MetabaseClient {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self> {
        url::Url::parse(base_url).map_err(|e| BridgeError::Config {
            message: format!("Invalid metadata API url {}: {}", base_url, e),
        })?;

        Ok(Self {
            http: HttpClient::new()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(NetworkConfig::API_KEY_HEADER, &self.api_key)
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = self.url(path);
        let request = self.authorize(self.http.inner().get(&url));
        let response = self.http.execute(request, &url).await?;
        Ok(response.json().await?)
    }

    async fn send_json(&self, method: reqwest::Method, path: &str, body: &Value) -> Result<Value> {
        let url = self.url(path);
        let request = self
            .authorize(self.http.inner().request(method, &url))
            .json(body);
        let response = self.http.execute(request, &url).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl MetadataSource for MetabaseClient {
    async fn get_card(&self, id: CardId) -> Result<Card> {
        let payload = self.get_json(&format!("card/{}", id)).await?;
        card_from_json(&payload)
    }

    async fn list_cards(&self, system_id: SystemId) -> Result<Vec<Card>> {
        let payload = self
            .get_json(&format!("card?f=database&model_id={}", system_id))
            .await?;
        let Value::Array(items) = payload else {
            return Err(malformed("card listing is not an array"));
        };

        let mut cards = Vec::with_capacity(items.len());
        for item in &items {
            match card_from_json(item) {
                Ok(card) if card.source_system_id == system_id => cards.push(card),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable card in listing: {}", e),
            }
        }
        info!("Listed {} cards for database {}", cards.len(), system_id);
        Ok(cards)
    }

    async fn get_schema(&self, system_id: SystemId) -> Result<SchemaCatalog> {
        let payload = self
            .get_json(&format!("database/{}/metadata", system_id))
            .await?;
        catalog_from_json(&payload)
    }

    async fn create_object(&self, definition: &CardDefinition) -> Result<CardId> {
        let payload = self
            .send_json(reqwest::Method::POST, "card", &definition_to_json(definition))
            .await?;
        let id = payload
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| malformed("created card has no id"))?;
        debug!("Created card {} ({})", id, definition.name);
        Ok(id)
    }

    async fn update_object(&self, id: CardId, definition: &CardDefinition) -> Result<()> {
        self.send_json(
            reqwest::Method::PUT,
            &format!("card/{}", id),
            &definition_to_json(definition),
        )
        .await?;
        debug!("Updated card {}", id);
        Ok(())
    }

    async fn execute(&self, id: CardId) -> Result<ExecutionReport> {
        let payload = self
            .send_json(reqwest::Method::POST, &format!("card/{}/query", id), &json!({}))
            .await?;
        Ok(execution_from_json(&payload))
    }
}

fn malformed(message: impl Into<String>) -> BridgeError {
    BridgeError::Json {
        message: message.into(),
        source: None,
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Build a [`Card`] from a `/api/card/:id` payload.
pub fn card_from_json(value: &Value) -> Result<Card> {
    let id = value
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| malformed("card has no id"))?;
    let dataset_query = value
        .get("dataset_query")
        .ok_or_else(|| malformed(format!("card {} has no dataset_query", id)))?;

    let (query_kind, body_key) = match dataset_query.get("type").and_then(Value::as_str) {
        Some("query") => (QueryKind::Structured, "query"),
        Some("native") => (QueryKind::Raw, "native"),
        other => {
            return Err(malformed(format!(
                "card {} has unsupported query type {:?}",
                id, other
            )))
        }
    };

    let source_system_id = dataset_query
        .get("database")
        .and_then(Value::as_i64)
        .or_else(|| value.get("database_id").and_then(Value::as_i64))
        .ok_or_else(|| malformed(format!("card {} has no database", id)))?;

    Ok(Card {
        id,
        name: string_field(value, "name").unwrap_or_else(|| format!("Card {}", id)),
        query_kind,
        query_body: dataset_query.get(body_key).cloned().unwrap_or(Value::Null),
        source_system_id,
        description: string_field(value, "description"),
        collection_id: value.get("collection_id").and_then(Value::as_i64),
        display: string_field(value, "display").unwrap_or_else(|| "table".to_string()),
        visualization_settings: value
            .get("visualization_settings")
            .cloned()
            .unwrap_or_else(|| json!({})),
    })
}

/// Build a [`SchemaCatalog`] from a `/api/database/:id/metadata` payload.
pub fn catalog_from_json(value: &Value) -> Result<SchemaCatalog> {
    let system_id = value
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| malformed("database metadata has no id"))?;

    let tables = value
        .get("tables")
        .and_then(Value::as_array)
        .map(|tables| tables.iter().filter_map(table_from_json).collect())
        .unwrap_or_default();

    Ok(SchemaCatalog { system_id, tables })
}

fn table_from_json(value: &Value) -> Option<TableDescriptor> {
    let id = value.get("id").and_then(Value::as_i64)?;
    let fields = value
        .get("fields")
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(|f| {
                    Some(FieldDescriptor {
                        id: f.get("id").and_then(Value::as_i64)?,
                        table_id: id,
                        name: string_field(f, "name")?,
                        display_name: string_field(f, "display_name").unwrap_or_default(),
                        base_type: string_field(f, "base_type").unwrap_or_default(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Some(TableDescriptor {
        id,
        schema: string_field(value, "schema"),
        name: string_field(value, "name")?,
        display_name: string_field(value, "display_name").unwrap_or_default(),
        fields,
    })
}

/// Request body for `POST /api/card` and `PUT /api/card/:id`.
pub fn definition_to_json(definition: &CardDefinition) -> Value {
    let (query_type, body_key) = match definition.query_kind {
        QueryKind::Structured => ("query", "query"),
        QueryKind::Raw => ("native", "native"),
    };

    json!({
        "name": definition.name,
        "description": definition.description,
        "display": definition.display,
        "visualization_settings": definition.visualization_settings,
        "collection_id": definition.container_id,
        "dataset_query": {
            "type": query_type,
            "database": definition.target_system_id,
            body_key: definition.query_body,
        },
    })
}

fn execution_from_json(value: &Value) -> ExecutionReport {
    let failed = value.get("status").and_then(Value::as_str) == Some("failed");
    let error = value
        .get("error")
        .and_then(|e| match e {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .or_else(|| failed.then(|| "query failed".to_string()));

    ExecutionReport {
        error,
        row_count: value.get("row_count").and_then(Value::as_u64),
    }
}
