//! Structured path: swap source table, field and card ids for target ids.

use super::query::{Expr, FieldTarget, SourceRef, StructuredQuery};
use crate::error::Result;
use crate::models::{CardId, FieldId, TableId, UnmatchedField, UnmatchedTable};
use crate::resolver::{Resolution, SchemaResolver};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Field options that carry a field id of their own.
const SOURCE_FIELD_OPTION: &str = "source-field";

/// Best-effort rewrite plus the gaps that kept it from being complete.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredRewrite {
    pub body: Value,
    pub warnings: Vec<String>,
    pub unmatched_tables: Vec<UnmatchedTable>,
    pub unmatched_fields: Vec<UnmatchedField>,
    /// Referenced cards with no target counterpart yet.
    pub unresolved_cards: Vec<CardId>,
}

impl StructuredRewrite {
    /// No source ids are left in the body.
    pub fn is_complete(&self) -> bool {
        self.unmatched_tables.is_empty()
            && self.unmatched_fields.is_empty()
            && self.unresolved_cards.is_empty()
    }
}

/// Rewrites structured queries against one resolver and card-id snapshot.
pub struct StructuredRewriter<'a> {
    resolver: &'a SchemaResolver,
    card_map: &'a BTreeMap<CardId, CardId>,
}

#[derive(Default)]
struct Gaps {
    tables: BTreeMap<TableId, UnmatchedTable>,
    fields: BTreeMap<FieldId, UnmatchedField>,
    cards: BTreeSet<CardId>,
}

impl<'a> StructuredRewriter<'a> {
    pub fn new(resolver: &'a SchemaResolver, card_map: &'a BTreeMap<CardId, CardId>) -> Self {
        Self { resolver, card_map }
    }

    /// Parse `body` and rewrite it.
    pub fn rewrite_body(&self, body: &Value) -> Result<StructuredRewrite> {
        let query = StructuredQuery::parse(body)?;
        Ok(self.rewrite(&query))
    }

    /// Rewrite a copy of `query`. Never fails; misses are reported as gaps.
    pub fn rewrite(&self, query: &StructuredQuery) -> StructuredRewrite {
        let mut query = query.clone();
        let mut gaps = Gaps::default();
        self.rewrite_query(&mut query, &mut gaps);

        let warnings = gaps
            .cards
            .iter()
            .map(|id| format!("card {} has not been migrated; reference left unchanged", id))
            .collect();

        StructuredRewrite {
            body: query.to_value(),
            warnings,
            unmatched_tables: gaps.tables.into_values().collect(),
            unmatched_fields: gaps.fields.into_values().collect(),
            unresolved_cards: gaps.cards.into_iter().collect(),
        }
    }

    fn rewrite_query(&self, query: &mut StructuredQuery, gaps: &mut Gaps) {
        match &mut query.source {
            Some(SourceRef::Table(id)) => match self.resolver.resolve_table(*id) {
                Resolution::Matched { target_id, .. } => *id = target_id,
                Resolution::Unmatched(unmatched) => {
                    gaps.tables.insert(unmatched.source_table_id, unmatched);
                }
            },
            Some(SourceRef::Card(id)) => match self.card_map.get(&*id) {
                Some(target) => *id = *target,
                None => {
                    gaps.cards.insert(*id);
                }
            },
            Some(SourceRef::Query(inner)) => self.rewrite_query(inner, gaps),
            None => {}
        }

        if let Some(filter) = &mut query.filter {
            self.rewrite_expr(filter, gaps);
        }
        for clause in [
            &mut query.aggregation,
            &mut query.breakout,
            &mut query.order_by,
            &mut query.fields,
        ]
        .into_iter()
        .flatten()
        {
            for expr in clause {
                self.rewrite_expr(expr, gaps);
            }
        }
        for (_, expr) in query.expressions.iter_mut().flatten() {
            self.rewrite_expr(expr, gaps);
        }
        for join in query.joins.iter_mut().flatten() {
            self.rewrite_query(&mut join.query, gaps);
            if let Some(condition) = &mut join.condition {
                self.rewrite_expr(condition, gaps);
            }
        }
    }

    fn rewrite_expr(&self, expr: &mut Expr, gaps: &mut Gaps) {
        match expr {
            Expr::Field { target, options } => {
                if let FieldTarget::Id(id) = target {
                    *id = self.rewrite_field_id(*id, gaps);
                }
                if let Some(options) = options {
                    self.rewrite_source_field(options, gaps);
                }
            }
            Expr::Op { args, .. } => {
                for arg in args {
                    self.rewrite_expr(arg, gaps);
                }
            }
            Expr::Literal(_) => {}
        }
    }

    fn rewrite_source_field(&self, options: &mut Map<String, Value>, gaps: &mut Gaps) {
        let Some(id) = options.get(SOURCE_FIELD_OPTION).and_then(Value::as_i64) else {
            return;
        };
        let target = self.rewrite_field_id(id, gaps);
        options.insert(SOURCE_FIELD_OPTION.to_string(), Value::from(target));
    }

    /// Target id, or the source id unchanged with the miss recorded.
    fn rewrite_field_id(&self, id: FieldId, gaps: &mut Gaps) -> FieldId {
        match self.resolver.resolve_field(id) {
            Resolution::Matched { target_id, .. } => target_id,
            Resolution::Unmatched(unmatched) => {
                gaps.fields.insert(id, unmatched);
                id
            }
        }
    }
}
