use super::{FieldId, SystemId, TableId};
use serde::{Deserialize, Serialize};

/// A column in a schema catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub id: FieldId,
    pub table_id: TableId,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub base_type: String,
}

/// A table and its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub id: TableId,
    #[serde(default)]
    pub schema: Option<String>,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

impl TableDescriptor {
    /// `schema.name`, or just `name` for schemaless tables.
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) if !schema.is_empty() => format!("{}.{}", schema, self.name),
            _ => self.name.clone(),
        }
    }
}

/// Every table the metadata source knows for one database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaCatalog {
    pub system_id: SystemId,
    pub tables: Vec<TableDescriptor>,
}

impl SchemaCatalog {
    pub fn table(&self, id: TableId) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.id == id)
    }

    /// Look up a field together with its owning table.
    pub fn field(&self, id: FieldId) -> Option<(&TableDescriptor, &FieldDescriptor)> {
        self.tables
            .iter()
            .find_map(|t| t.fields.iter().find(|f| f.id == id).map(|f| (t, f)))
    }

    pub fn field_count(&self) -> usize {
        self.tables.iter().map(|t| t.fields.len()).sum()
    }
}
