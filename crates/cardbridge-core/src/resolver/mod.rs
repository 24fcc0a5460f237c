//! Schema correspondence between the source and target catalogs.
//!
//! [`SchemaResolver`] answers "which target table/field stands in for this
//! source id" with a fixed precedence:
//!
//! 1. a confirmed, non-ignored mapping from the [`MappingStore`]
//! 2. an exact name match (tables by `(schema, name)`, fields by name within
//!    the resolved target table)
//! 3. a normalized name match against target names and display names, only
//!    when exactly one candidate qualifies
//! 4. otherwise the id is unmatched and recorded in the unmatched registry
//!
//! The bulk suggestion pass ([`SchemaResolver::suggest_table_mappings`] and
//! [`SchemaResolver::suggest_field_mappings`]) only pre-populates mappings for
//! review. It never overwrites a confirmed mapping.

mod naming;
mod scoring;

pub use naming::normalize_identifier;
pub use scoring::{rank_candidates, score_name, NameCandidate};

use crate::config::{Dialect, ResolverConfig};
use crate::error::{BridgeError, Result};
use crate::models::{
    FieldDescriptor, FieldId, FieldMapping, MappingMethod, SchemaCatalog, TableDescriptor,
    TableId, TableMapping, UnmatchedField, UnmatchedTable,
};
use crate::rewrite::SchemaContext;
use crate::store::MappingStore;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info};

/// Which precedence step produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Confirmed,
    ExactName,
    NormalizedName,
}

/// Answer to a resolve call.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<U> {
    Matched {
        target_id: i64,
        kind: MatchKind,
        confidence: f64,
    },
    Unmatched(U),
}

impl<U> Resolution<U> {
    pub fn target(&self) -> Option<i64> {
        match self {
            Resolution::Matched { target_id, .. } => Some(*target_id),
            Resolution::Unmatched(_) => None,
        }
    }

    fn matched(target_id: i64, kind: MatchKind) -> Self {
        let confidence = match kind {
            MatchKind::Confirmed | MatchKind::ExactName => ResolverConfig::EXACT_NAME_SCORE,
            MatchKind::NormalizedName => ResolverConfig::NORMALIZED_NAME_SCORE,
        };
        Resolution::Matched {
            target_id,
            kind,
            confidence,
        }
    }
}

pub type TableResolution = Resolution<UnmatchedTable>;
pub type FieldResolution = Resolution<UnmatchedField>;

/// Resolver over one source/target catalog pair.
///
/// Loaded once from the store and shared behind an `Arc`. Mapping writes go
/// through to the store before the in-memory view is updated.
pub struct SchemaResolver {
    store: Arc<dyn MappingStore>,
    source: SchemaCatalog,
    target: SchemaCatalog,
    tables: RwLock<BTreeMap<TableId, TableMapping>>,
    fields: RwLock<BTreeMap<FieldId, FieldMapping>>,
    unmatched_tables: Mutex<BTreeMap<TableId, UnmatchedTable>>,
    unmatched_fields: Mutex<BTreeMap<FieldId, UnmatchedField>>,
}

impl std::fmt::Debug for SchemaResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaResolver")
            .field("source_system_id", &self.source.system_id)
            .field("target_system_id", &self.target.system_id)
            .finish_non_exhaustive()
    }
}

impl SchemaResolver {
    /// Load every stored mapping and bind them to the two catalogs.
    pub fn load(
        store: Arc<dyn MappingStore>,
        source: SchemaCatalog,
        target: SchemaCatalog,
    ) -> Result<Self> {
        let tables: BTreeMap<_, _> = store
            .table_mappings()?
            .into_iter()
            .map(|m| (m.source_table_id, m))
            .collect();
        let fields: BTreeMap<_, _> = store
            .field_mappings()?
            .into_iter()
            .map(|m| (m.source_field_id, m))
            .collect();

        info!(
            "Loaded resolver: {} source tables, {} target tables, {} table mappings, {} field mappings",
            source.tables.len(),
            target.tables.len(),
            tables.len(),
            fields.len()
        );

        Ok(Self {
            store,
            source,
            target,
            tables: RwLock::new(tables),
            fields: RwLock::new(fields),
            unmatched_tables: Mutex::new(BTreeMap::new()),
            unmatched_fields: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn source_catalog(&self) -> &SchemaCatalog {
        &self.source
    }

    pub fn target_catalog(&self) -> &SchemaCatalog {
        &self.target
    }

    // ========================================
    // Resolution
    // ========================================

    pub fn resolve_table(&self, source_table_id: TableId) -> TableResolution {
        match self.lookup_table(source_table_id) {
            Some((target_id, kind)) => Resolution::matched(target_id, kind),
            None => {
                let unmatched = self.unmatched_table_label(source_table_id);
                self.unmatched_tables
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(source_table_id, unmatched.clone());
                Resolution::Unmatched(unmatched)
            }
        }
    }

    pub fn resolve_field(&self, source_field_id: FieldId) -> FieldResolution {
        match self.lookup_field(source_field_id) {
            Some((target_id, kind)) => Resolution::matched(target_id, kind),
            None => {
                let unmatched = self.unmatched_field_label(source_field_id);
                self.unmatched_fields
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(source_field_id, unmatched.clone());
                Resolution::Unmatched(unmatched)
            }
        }
    }

    /// Target fields a reviewer should pick from, best name match first.
    pub fn candidates_for_field(&self, source_field_id: FieldId) -> Vec<FieldDescriptor> {
        let Some((source_table, source_field)) = self.source.field(source_field_id) else {
            return Vec::new();
        };
        let Some(target_table) = self
            .lookup_table(source_table.id)
            .and_then(|(id, _)| self.target.table(id))
        else {
            return Vec::new();
        };

        let mut scored: Vec<(f64, &FieldDescriptor)> = target_table
            .fields
            .iter()
            .map(|f| {
                let score =
                    score_name(&source_field.name, &f.name, &f.display_name).unwrap_or(0.0);
                (score, f)
            })
            .collect();
        scored.sort_by(|(a_score, a), (b_score, b)| {
            b_score
                .partial_cmp(a_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });

        scored
            .into_iter()
            .take(ResolverConfig::MAX_FIELD_CANDIDATES)
            .map(|(_, f)| f.clone())
            .collect()
    }

    fn lookup_table(&self, source_table_id: TableId) -> Option<(TableId, MatchKind)> {
        let confirmed = self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&source_table_id)
            .and_then(TableMapping::confirmed_target);
        if let Some(target_id) = confirmed {
            return Some((target_id, MatchKind::Confirmed));
        }

        let source = self.source.table(source_table_id)?;

        if let Some(t) = self
            .target
            .tables
            .iter()
            .find(|t| t.schema == source.schema && t.name == source.name)
        {
            return Some((t.id, MatchKind::ExactName));
        }

        let wanted = normalize_identifier(&source.name);
        let mut hits = self.target.tables.iter().filter(|t| {
            normalize_identifier(&t.name) == wanted || normalize_identifier(&t.display_name) == wanted
        });
        match (hits.next(), hits.next()) {
            (Some(t), None) => Some((t.id, MatchKind::NormalizedName)),
            _ => None,
        }
    }

    fn lookup_field(&self, source_field_id: FieldId) -> Option<(FieldId, MatchKind)> {
        let confirmed = self
            .fields
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&source_field_id)
            .and_then(FieldMapping::confirmed_target);
        if let Some(target_id) = confirmed {
            return Some((target_id, MatchKind::Confirmed));
        }

        let (source_table, source_field) = self.source.field(source_field_id)?;
        let (target_table_id, _) = self.lookup_table(source_table.id)?;
        let target_table = self.target.table(target_table_id)?;

        if let Some(f) = target_table.fields.iter().find(|f| f.name == source_field.name) {
            return Some((f.id, MatchKind::ExactName));
        }

        let wanted = normalize_identifier(&source_field.name);
        let mut hits = target_table.fields.iter().filter(|f| {
            normalize_identifier(&f.name) == wanted || normalize_identifier(&f.display_name) == wanted
        });
        match (hits.next(), hits.next()) {
            (Some(f), None) => Some((f.id, MatchKind::NormalizedName)),
            _ => None,
        }
    }

    fn unmatched_table_label(&self, source_table_id: TableId) -> UnmatchedTable {
        let label = self
            .source
            .table(source_table_id)
            .map(TableDescriptor::qualified_name)
            .unwrap_or_else(|| format!("table#{}", source_table_id));
        UnmatchedTable {
            source_table_id,
            label,
        }
    }

    fn unmatched_field_label(&self, source_field_id: FieldId) -> UnmatchedField {
        match self.source.field(source_field_id) {
            Some((table, field)) => UnmatchedField {
                source_field_id,
                field_name: field.name.clone(),
                table_name: table.qualified_name(),
            },
            None => UnmatchedField {
                source_field_id,
                field_name: format!("field#{}", source_field_id),
                table_name: "unknown".to_string(),
            },
        }
    }

    // ========================================
    // Mapping writes
    // ========================================

    /// Full upsert keyed by source table id.
    pub fn set_table_mapping(&self, mapping: TableMapping) -> Result<()> {
        self.store.upsert_table_mapping(&mapping)?;
        let source_id = mapping.source_table_id;
        self.tables
            .write()
            .map_err(|_| BridgeError::Other("Failed to acquire table mapping lock".to_string()))?
            .insert(source_id, mapping);
        self.unmatched_tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&source_id);
        Ok(())
    }

    /// Full upsert keyed by source field id.
    pub fn set_field_mapping(&self, mapping: FieldMapping) -> Result<()> {
        self.store.upsert_field_mapping(&mapping)?;
        let source_id = mapping.source_field_id;
        self.fields
            .write()
            .map_err(|_| BridgeError::Other("Failed to acquire field mapping lock".to_string()))?
            .insert(source_id, mapping);
        self.unmatched_fields
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&source_id);
        Ok(())
    }

    /// Manually pin a source table to a target table.
    pub fn confirm_table(
        &self,
        source_table_id: TableId,
        target_table_id: TableId,
    ) -> Result<TableMapping> {
        let target = self.target.table(target_table_id).ok_or_else(|| BridgeError::NotFound {
            what: format!("target table {}", target_table_id),
        })?;
        let source_name = self.unmatched_table_label(source_table_id).label;

        let mut mapping = TableMapping::manual(
            source_table_id,
            source_name,
            target_table_id,
            target.qualified_name(),
        );
        if let Some(existing) = self.table_mapping(source_table_id) {
            mapping.alternatives = existing.alternatives;
        }

        info!(
            "Confirmed table mapping {} -> {}",
            mapping.source_table_name, target_table_id
        );
        self.set_table_mapping(mapping.clone())?;
        Ok(mapping)
    }

    /// Manually pin a source field to a target field.
    pub fn confirm_field(
        &self,
        source_field_id: FieldId,
        target_field_id: FieldId,
    ) -> Result<FieldMapping> {
        let (target_table, target_field) =
            self.target.field(target_field_id).ok_or_else(|| BridgeError::NotFound {
                what: format!("target field {}", target_field_id),
            })?;
        let source = self.unmatched_field_label(source_field_id);
        let source_table_id = self
            .source
            .field(source_field_id)
            .map(|(t, _)| t.id)
            .unwrap_or_default();
        let alternatives = self
            .field_mapping(source_field_id)
            .map(|m| m.alternatives)
            .unwrap_or_default();

        let mapping = FieldMapping {
            source_field_id,
            source_field_name: source.field_name,
            source_table_id,
            target_table_id: Some(target_table.id),
            suggested_target_field_id: Some(target_field_id),
            suggested_target_field_name: Some(target_field.name.clone()),
            confidence: 1.0,
            alternatives,
            confirmed: true,
            final_target_field_id: Some(target_field_id),
            ignored: false,
            method: MappingMethod::Manual,
            updated_at: Utc::now(),
        };

        info!(
            "Confirmed field mapping {} -> {}",
            source_field_id, target_field_id
        );
        self.set_field_mapping(mapping.clone())?;
        Ok(mapping)
    }

    /// Record a suggestion that came from outside the heuristics.
    ///
    /// The mapping is stored unconfirmed. A confirmed mapping is left as is
    /// and returned unchanged.
    pub fn record_field_suggestion(
        &self,
        source_field_id: FieldId,
        target_field_id: FieldId,
        confidence: f64,
    ) -> Result<FieldMapping> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(BridgeError::Validation {
                field: "confidence".to_string(),
                message: format!("{} is outside 0..=1", confidence),
            });
        }
        if let Some(existing) = self.field_mapping(source_field_id) {
            if existing.confirmed {
                debug!(
                    "Keeping confirmed mapping for field {} over external suggestion",
                    source_field_id
                );
                return Ok(existing);
            }
        }

        let (target_table, target_field) =
            self.target.field(target_field_id).ok_or_else(|| BridgeError::NotFound {
                what: format!("target field {}", target_field_id),
            })?;
        let source = self.unmatched_field_label(source_field_id);
        let source_table_id = self
            .source
            .field(source_field_id)
            .map(|(t, _)| t.id)
            .unwrap_or_default();

        let mapping = FieldMapping {
            source_field_id,
            source_field_name: source.field_name,
            source_table_id,
            target_table_id: Some(target_table.id),
            suggested_target_field_id: Some(target_field_id),
            suggested_target_field_name: Some(target_field.name.clone()),
            confidence,
            alternatives: Vec::new(),
            confirmed: false,
            final_target_field_id: None,
            ignored: false,
            method: MappingMethod::ExternalSuggestion,
            updated_at: Utc::now(),
        };
        self.set_field_mapping(mapping.clone())?;
        Ok(mapping)
    }

    pub fn table_mapping(&self, source_table_id: TableId) -> Option<TableMapping> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&source_table_id)
            .cloned()
    }

    pub fn field_mapping(&self, source_field_id: FieldId) -> Option<FieldMapping> {
        self.fields
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&source_field_id)
            .cloned()
    }

    // ========================================
    // Bulk suggestion
    // ========================================

    /// Pre-populate table mappings for review from name similarity.
    ///
    /// Returns the mappings written. Confirmed and ignored mappings are
    /// skipped.
    pub fn suggest_table_mappings(&self) -> Result<Vec<TableMapping>> {
        let mut written = Vec::new();

        for source in &self.source.tables {
            if self.is_settled_table(source.id) {
                continue;
            }

            let ranked = rank_candidates(
                &source.name,
                self.target.tables.iter().map(|t| NameCandidate {
                    id: t.id,
                    name: &t.name,
                    display_name: &t.display_name,
                }),
                ResolverConfig::IDENTICAL_TABLE_NAME_BONUS,
            );
            let best = ranked.first();
            let best_table = best.and_then(|c| self.target.table(c.target_id));

            let mapping = TableMapping {
                source_table_id: source.id,
                source_table_name: source.qualified_name(),
                suggested_target_table_id: best.map(|c| c.target_id),
                suggested_target_table_name: best_table.map(TableDescriptor::qualified_name),
                confidence: best.map(|c| c.score).unwrap_or(0.0),
                alternatives: ranked,
                confirmed: false,
                final_target_table_id: None,
                ignored: false,
                method: MappingMethod::Heuristic,
                updated_at: Utc::now(),
            };
            self.set_table_mapping(mapping.clone())?;
            written.push(mapping);
        }

        info!("Suggested {} table mappings", written.len());
        Ok(written)
    }

    /// Pre-populate field mappings for every source table with a target.
    pub fn suggest_field_mappings(&self) -> Result<Vec<FieldMapping>> {
        let mut written = Vec::new();

        for source_table in &self.source.tables {
            let Some(target_table) = self
                .lookup_table(source_table.id)
                .and_then(|(id, _)| self.target.table(id))
            else {
                continue;
            };

            for source_field in &source_table.fields {
                if self.is_settled_field(source_field.id) {
                    continue;
                }

                let ranked = rank_candidates(
                    &source_field.name,
                    target_table.fields.iter().map(|f| NameCandidate {
                        id: f.id,
                        name: &f.name,
                        display_name: &f.display_name,
                    }),
                    0.0,
                );
                let best = ranked.first();

                let mapping = FieldMapping {
                    source_field_id: source_field.id,
                    source_field_name: source_field.name.clone(),
                    source_table_id: source_table.id,
                    target_table_id: Some(target_table.id),
                    suggested_target_field_id: best.map(|c| c.target_id),
                    suggested_target_field_name: best.map(|c| c.target_name.clone()),
                    confidence: best.map(|c| c.score).unwrap_or(0.0),
                    alternatives: ranked,
                    confirmed: false,
                    final_target_field_id: None,
                    ignored: false,
                    method: MappingMethod::Heuristic,
                    updated_at: Utc::now(),
                };
                self.set_field_mapping(mapping.clone())?;
                written.push(mapping);
            }
        }

        info!("Suggested {} field mappings", written.len());
        Ok(written)
    }

    fn is_settled_table(&self, source_table_id: TableId) -> bool {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&source_table_id)
            .is_some_and(|m| m.confirmed || m.ignored)
    }

    fn is_settled_field(&self, source_field_id: FieldId) -> bool {
        self.fields
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&source_field_id)
            .is_some_and(|m| m.confirmed || m.ignored)
    }

    // ========================================
    // Unmatched registry
    // ========================================

    /// Tables that failed to resolve since they were last mapped.
    pub fn unmatched_tables(&self) -> Vec<UnmatchedTable> {
        self.unmatched_tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Fields that failed to resolve since they were last mapped.
    pub fn unmatched_fields(&self) -> Vec<UnmatchedField> {
        self.unmatched_fields
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Resolve every source table and field and report what is missing.
    pub fn unmatched_report(&self) -> (Vec<UnmatchedTable>, Vec<UnmatchedField>) {
        for table in &self.source.tables {
            self.resolve_table(table.id);
            for field in &table.fields {
                self.resolve_field(field.id);
            }
        }
        (self.unmatched_tables(), self.unmatched_fields())
    }

    // ========================================
    // Text path context
    // ========================================

    /// Dialects, table renames and the target table listing for the text
    /// rewrite path.
    pub fn schema_context(&self, source_dialect: Dialect, target_dialect: Dialect) -> SchemaContext {
        let mut table_renames = BTreeMap::new();
        for source in &self.source.tables {
            let Some(target) = self
                .lookup_table(source.id)
                .and_then(|(id, _)| self.target.table(id))
            else {
                continue;
            };
            let from = source.qualified_name();
            let to = target.qualified_name();
            if from != to {
                table_renames.insert(from, to);
            }
        }

        SchemaContext {
            source_dialect,
            target_dialect,
            table_renames,
            target_tables: self
                .target
                .tables
                .iter()
                .map(TableDescriptor::qualified_name)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn table(id: TableId, schema: &str, name: &str, fields: Vec<FieldDescriptor>) -> TableDescriptor {
        TableDescriptor {
            id,
            schema: Some(schema.to_string()),
            name: name.to_string(),
            display_name: String::new(),
            fields,
        }
    }

    fn field(id: FieldId, table_id: TableId, name: &str, display_name: &str) -> FieldDescriptor {
        FieldDescriptor {
            id,
            table_id,
            name: name.to_string(),
            display_name: display_name.to_string(),
            base_type: "type/Text".to_string(),
        }
    }

    fn catalogs() -> (SchemaCatalog, SchemaCatalog) {
        let source = SchemaCatalog {
            system_id: 1,
            tables: vec![
                table(
                    10,
                    "public",
                    "orders",
                    vec![
                        field(55, 10, "cust_id", "Cust ID"),
                        field(56, 10, "total", "Total"),
                        field(57, 10, "legacy_flag", "Legacy Flag"),
                    ],
                ),
                table(11, "public", "events", vec![field(60, 11, "kind", "Kind")]),
                table(12, "public", "audit_log", vec![]),
            ],
        };
        let target = SchemaCatalog {
            system_id: 2,
            tables: vec![
                table(
                    200,
                    "default",
                    "orders",
                    vec![
                        field(210, 200, "customer_id", "Cust Id"),
                        field(211, 200, "total", "Total"),
                    ],
                ),
                table(201, "public", "events", vec![field(220, 201, "kind", "Kind")]),
            ],
        };
        (source, target)
    }

    fn resolver() -> (Arc<MemoryStore>, SchemaResolver) {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_table_mapping(&TableMapping::manual(10, "public.orders", 200, "default.orders"))
            .unwrap();
        let (source, target) = catalogs();
        let resolver = SchemaResolver::load(store.clone(), source, target).unwrap();
        (store, resolver)
    }

    #[test]
    fn test_confirmed_table_mapping_wins() {
        let (_, resolver) = resolver();
        assert_eq!(
            resolver.resolve_table(10),
            Resolution::Matched {
                target_id: 200,
                kind: MatchKind::Confirmed,
                confidence: 1.0
            }
        );
    }

    #[test]
    fn test_exact_schema_and_name() {
        let (_, resolver) = resolver();
        let resolution = resolver.resolve_table(11);
        assert_eq!(resolution.target(), Some(201));
        assert!(matches!(
            resolution,
            Resolution::Matched {
                kind: MatchKind::ExactName,
                ..
            }
        ));
    }

    #[test]
    fn test_normalized_field_match_through_display_name() {
        let (_, resolver) = resolver();
        assert_eq!(
            resolver.resolve_field(55),
            Resolution::Matched {
                target_id: 210,
                kind: MatchKind::NormalizedName,
                confidence: 0.92
            }
        );
        assert_eq!(resolver.resolve_field(56).target(), Some(211));
    }

    #[test]
    fn test_unmatched_is_recorded_and_cleared_by_mapping() {
        let (store, resolver) = resolver();
        let Resolution::Unmatched(unmatched) = resolver.resolve_field(57) else {
            panic!("legacy_flag should not resolve");
        };
        assert_eq!(unmatched.label(), "public.orders.legacy_flag");
        assert_eq!(resolver.unmatched_fields().len(), 1);

        resolver.confirm_field(57, 211).unwrap();
        assert!(resolver.unmatched_fields().is_empty());
        assert_eq!(resolver.resolve_field(57).target(), Some(211));
        assert_eq!(store.field_mappings().unwrap().len(), 1);
    }

    #[test]
    fn test_unmatched_report_resolves_everything_first() {
        let (_, resolver) = resolver();
        assert!(resolver.unmatched_tables().is_empty());

        let (tables, fields) = resolver.unmatched_report();
        let tables: Vec<&str> = tables.iter().map(|t| t.label.as_str()).collect();
        let fields: Vec<String> = fields.iter().map(|f| f.label()).collect();
        assert_eq!(tables, vec!["public.audit_log"]);
        assert_eq!(fields, vec!["public.orders.legacy_flag".to_string()]);
    }

    #[test]
    fn test_unknown_table_label() {
        let (_, resolver) = resolver();
        let Resolution::Unmatched(unmatched) = resolver.resolve_table(999) else {
            panic!("unknown table should not resolve");
        };
        assert_eq!(unmatched.label, "table#999");
    }

    #[test]
    fn test_ignored_mapping_is_not_authoritative() {
        let (_, resolver) = resolver();
        let mut mapping = TableMapping::manual(12, "public.audit_log", 200, "default.orders");
        mapping.ignored = true;
        resolver.set_table_mapping(mapping).unwrap();
        assert!(resolver.resolve_table(12).target().is_none());
    }

    #[test]
    fn test_suggestion_never_overwrites_confirmed() {
        let (store, resolver) = resolver();
        let written = resolver.suggest_table_mappings().unwrap();
        assert!(written.iter().all(|m| m.source_table_id != 10));

        let events = written.iter().find(|m| m.source_table_id == 11).unwrap();
        assert_eq!(events.suggested_target_table_id, Some(201));
        assert_eq!(events.confidence, 1.0);
        assert!(!events.confirmed);

        let stored = store.table_mappings().unwrap();
        assert!(stored.iter().any(|m| m.source_table_id == 10 && m.confirmed));
    }

    #[test]
    fn test_field_suggestions_rank_candidates() {
        let (_, resolver) = resolver();
        let written = resolver.suggest_field_mappings().unwrap();
        let cust = written.iter().find(|m| m.source_field_id == 55).unwrap();
        assert_eq!(cust.suggested_target_field_id, Some(210));
        assert_eq!(cust.confidence, 0.92);
        assert_eq!(cust.method, MappingMethod::Heuristic);
    }

    #[test]
    fn test_external_suggestion_keeps_confirmed() {
        let (_, resolver) = resolver();
        resolver.confirm_field(56, 211).unwrap();
        let kept = resolver.record_field_suggestion(56, 210, 0.4).unwrap();
        assert_eq!(kept.method, MappingMethod::Manual);

        let suggested = resolver.record_field_suggestion(57, 210, 0.4).unwrap();
        assert_eq!(suggested.method, MappingMethod::ExternalSuggestion);
        assert!(!suggested.confirmed);
        assert!(resolver.resolve_field(57).target().is_none());

        assert!(matches!(
            resolver.record_field_suggestion(57, 210, 1.5),
            Err(BridgeError::Validation { .. })
        ));
    }

    #[test]
    fn test_candidates_for_field() {
        let (_, resolver) = resolver();
        let candidates = resolver.candidates_for_field(55);
        assert_eq!(candidates.first().map(|f| f.id), Some(210));
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_schema_context_renames() {
        let (_, resolver) = resolver();
        let ctx = resolver.schema_context(Dialect::Postgres, Dialect::ClickHouse);
        assert_eq!(
            ctx.table_renames.get("public.orders").map(String::as_str),
            Some("default.orders")
        );
        assert!(!ctx.table_renames.contains_key("public.events"));
        assert_eq!(ctx.target_tables, vec!["default.orders", "public.events"]);
    }
}
