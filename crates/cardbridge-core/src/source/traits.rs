use crate::error::Result;
use crate::models::{Card, CardDefinition, CardId, ExecutionReport, SchemaCatalog, SystemId};
use async_trait::async_trait;

/// Remote BI metadata API.
///
/// Every call may fail transiently; the orchestrator decides what to retry.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn get_card(&self, id: CardId) -> Result<Card>;

    /// Every card whose query runs against `system_id`.
    async fn list_cards(&self, system_id: SystemId) -> Result<Vec<Card>>;

    async fn get_schema(&self, system_id: SystemId) -> Result<SchemaCatalog>;

    /// Create a card and return its id.
    async fn create_object(&self, definition: &CardDefinition) -> Result<CardId>;

    async fn update_object(&self, id: CardId, definition: &CardDefinition) -> Result<()>;

    /// Run a card once. A query error is reported in the result, not as `Err`.
    async fn execute(&self, id: CardId) -> Result<ExecutionReport>;
}
