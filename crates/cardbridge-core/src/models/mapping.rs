//! Schema correspondence records.

use super::{FieldId, TableId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a mapping came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingMethod {
    Heuristic,
    ExternalSuggestion,
    Manual,
}

/// A ranked target candidate kept alongside a suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingCandidate {
    pub target_id: i64,
    pub target_name: String,
    pub score: f64,
}

/// Correspondence of one source table to a target table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMapping {
    pub source_table_id: TableId,
    pub source_table_name: String,
    pub suggested_target_table_id: Option<TableId>,
    pub suggested_target_table_name: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub alternatives: Vec<MappingCandidate>,
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default)]
    pub final_target_table_id: Option<TableId>,
    #[serde(default)]
    pub ignored: bool,
    pub method: MappingMethod,
    pub updated_at: DateTime<Utc>,
}

impl TableMapping {
    /// A human-confirmed mapping straight to `target_table_id`.
    pub fn manual(
        source_table_id: TableId,
        source_table_name: impl Into<String>,
        target_table_id: TableId,
        target_table_name: impl Into<String>,
    ) -> Self {
        Self {
            source_table_id,
            source_table_name: source_table_name.into(),
            suggested_target_table_id: Some(target_table_id),
            suggested_target_table_name: Some(target_table_name.into()),
            confidence: 1.0,
            alternatives: Vec::new(),
            confirmed: true,
            final_target_table_id: Some(target_table_id),
            ignored: false,
            method: MappingMethod::Manual,
            updated_at: Utc::now(),
        }
    }

    /// Target this mapping commits to, if it is authoritative.
    ///
    /// Only confirmed, non-ignored mappings are authoritative.
    pub fn confirmed_target(&self) -> Option<TableId> {
        if !self.confirmed || self.ignored {
            return None;
        }
        self.final_target_table_id.or(self.suggested_target_table_id)
    }
}

/// Correspondence of one source field to a target field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source_field_id: FieldId,
    pub source_field_name: String,
    pub source_table_id: TableId,
    pub target_table_id: Option<TableId>,
    pub suggested_target_field_id: Option<FieldId>,
    pub suggested_target_field_name: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub alternatives: Vec<MappingCandidate>,
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default)]
    pub final_target_field_id: Option<FieldId>,
    #[serde(default)]
    pub ignored: bool,
    pub method: MappingMethod,
    pub updated_at: DateTime<Utc>,
}

impl FieldMapping {
    pub fn confirmed_target(&self) -> Option<FieldId> {
        if !self.confirmed || self.ignored {
            return None;
        }
        self.final_target_field_id.or(self.suggested_target_field_id)
    }
}

/// A source table with no target counterpart.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnmatchedTable {
    pub source_table_id: TableId,
    /// Qualified name, or `table#<id>` when the catalog does not know it.
    pub label: String,
}

/// A source field with no target counterpart.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnmatchedField {
    pub source_field_id: FieldId,
    pub field_name: String,
    pub table_name: String,
}

impl UnmatchedField {
    pub fn label(&self) -> String {
        format!("{}.{}", self.table_name, self.field_name)
    }
}
