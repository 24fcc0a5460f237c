//! Typed view of a structured query body.
//!
//! Parsing is shallow where it can be: only the keys that carry table, field
//! or card ids are modeled, everything else rides along in `extra` and is
//! written back untouched.

use crate::error::{BridgeError, Result};
use crate::graph::{card_reference, parse_card_reference};
use crate::models::{CardId, FieldId, TableId};
use serde_json::{Map, Value};

const SOURCE_TABLE: &str = "source-table";
const SOURCE_QUERY: &str = "source-query";
const FILTER: &str = "filter";
const AGGREGATION: &str = "aggregation";
const BREAKOUT: &str = "breakout";
const ORDER_BY: &str = "order-by";
const FIELDS: &str = "fields";
const EXPRESSIONS: &str = "expressions";
const JOINS: &str = "joins";
const CONDITION: &str = "condition";
const ALIAS: &str = "alias";

/// Where a query reads its rows from.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRef {
    Table(TableId),
    Card(CardId),
    Query(Box<StructuredQuery>),
}

/// How a field reference names its column.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldTarget {
    Id(FieldId),
    /// Column of a nested query or card, addressed by name.
    Name(String),
}

/// A clause expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `["field", <id|name>, <options|null>]`
    Field {
        target: FieldTarget,
        options: Option<Map<String, Value>>,
    },
    Literal(Value),
    /// `["<name>", args...]`
    Op { name: String, args: Vec<Expr> },
}

/// A join: a nested query plus how it attaches.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub query: StructuredQuery,
    pub condition: Option<Expr>,
    pub alias: Option<String>,
}

/// A structured query tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredQuery {
    pub source: Option<SourceRef>,
    pub filter: Option<Expr>,
    pub aggregation: Option<Vec<Expr>>,
    pub breakout: Option<Vec<Expr>>,
    pub order_by: Option<Vec<Expr>>,
    pub fields: Option<Vec<Expr>>,
    pub expressions: Option<Vec<(String, Expr)>>,
    pub joins: Option<Vec<Join>>,
    /// Keys this model does not interpret.
    pub extra: Map<String, Value>,
}

impl StructuredQuery {
    /// Parse a structured body.
    pub fn parse(body: &Value) -> Result<Self> {
        let Value::Object(map) = body else {
            return Err(parse_error("structured query must be a JSON object"));
        };

        let mut query = StructuredQuery::default();
        for (key, value) in map {
            match key.as_str() {
                SOURCE_TABLE => query.source = Some(parse_source_table(value)?),
                SOURCE_QUERY => {
                    query.source = Some(SourceRef::Query(Box::new(StructuredQuery::parse(value)?)))
                }
                FILTER => query.filter = Some(Expr::parse(value)?),
                AGGREGATION => query.aggregation = Some(parse_clause(key, value)?),
                BREAKOUT => query.breakout = Some(parse_clause(key, value)?),
                ORDER_BY => query.order_by = Some(parse_clause(key, value)?),
                // `"fields": "all"` and friends are not lists of expressions.
                FIELDS if value.is_array() => query.fields = Some(parse_clause(key, value)?),
                EXPRESSIONS => {
                    let Value::Object(named) = value else {
                        return Err(parse_error("expressions must be an object"));
                    };
                    let parsed = named
                        .iter()
                        .map(|(name, expr)| Ok((name.clone(), Expr::parse(expr)?)))
                        .collect::<Result<Vec<_>>>()?;
                    query.expressions = Some(parsed);
                }
                JOINS => {
                    let Value::Array(joins) = value else {
                        return Err(parse_error("joins must be an array"));
                    };
                    query.joins = Some(joins.iter().map(Join::parse).collect::<Result<_>>()?);
                }
                _ => {
                    query.extra.insert(key.clone(), value.clone());
                }
            }
        }

        Ok(query)
    }

    pub fn to_value(&self) -> Value {
        let mut map = self.extra.clone();

        match &self.source {
            Some(SourceRef::Table(id)) => {
                map.insert(SOURCE_TABLE.into(), Value::from(*id));
            }
            Some(SourceRef::Card(id)) => {
                map.insert(SOURCE_TABLE.into(), Value::String(card_reference(*id)));
            }
            Some(SourceRef::Query(inner)) => {
                map.insert(SOURCE_QUERY.into(), inner.to_value());
            }
            None => {}
        }
        if let Some(filter) = &self.filter {
            map.insert(FILTER.into(), filter.to_value());
        }
        for (key, clause) in [
            (AGGREGATION, &self.aggregation),
            (BREAKOUT, &self.breakout),
            (ORDER_BY, &self.order_by),
            (FIELDS, &self.fields),
        ] {
            if let Some(exprs) = clause {
                map.insert(
                    key.into(),
                    Value::Array(exprs.iter().map(Expr::to_value).collect()),
                );
            }
        }
        if let Some(expressions) = &self.expressions {
            let named: Map<String, Value> = expressions
                .iter()
                .map(|(name, expr)| (name.clone(), expr.to_value()))
                .collect();
            map.insert(EXPRESSIONS.into(), Value::Object(named));
        }
        if let Some(joins) = &self.joins {
            map.insert(
                JOINS.into(),
                Value::Array(joins.iter().map(Join::to_value).collect()),
            );
        }

        Value::Object(map)
    }
}

impl Join {
    fn parse(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(parse_error("join must be an object"));
        };

        let mut rest = map.clone();
        let condition = rest.remove(CONDITION).map(|c| Expr::parse(&c)).transpose()?;
        let alias = match rest.remove(ALIAS) {
            Some(Value::String(alias)) => Some(alias),
            Some(other) => return Err(parse_error(format!("join alias must be a string: {}", other))),
            None => None,
        };

        Ok(Join {
            query: StructuredQuery::parse(&Value::Object(rest))?,
            condition,
            alias,
        })
    }

    fn to_value(&self) -> Value {
        let mut value = self.query.to_value();
        if let Value::Object(map) = &mut value {
            if let Some(condition) = &self.condition {
                map.insert(CONDITION.into(), condition.to_value());
            }
            if let Some(alias) = &self.alias {
                map.insert(ALIAS.into(), Value::String(alias.clone()));
            }
        }
        value
    }
}

impl Expr {
    pub fn parse(value: &Value) -> Result<Self> {
        let Value::Array(items) = value else {
            return Ok(Expr::Literal(value.clone()));
        };
        let Some(Value::String(head)) = items.first() else {
            return Ok(Expr::Literal(value.clone()));
        };

        if head == "field" {
            let target = match items.get(1) {
                Some(Value::Number(n)) => FieldTarget::Id(
                    n.as_i64()
                        .ok_or_else(|| parse_error(format!("field id is not an integer: {}", n)))?,
                ),
                Some(Value::String(name)) => FieldTarget::Name(name.clone()),
                other => {
                    return Err(parse_error(format!(
                        "field reference without id or name: {:?}",
                        other
                    )))
                }
            };
            let options = match items.get(2) {
                Some(Value::Object(opts)) => Some(opts.clone()),
                Some(Value::Null) | None => None,
                Some(other) => {
                    return Err(parse_error(format!("field options must be an object: {}", other)))
                }
            };
            return Ok(Expr::Field { target, options });
        }

        let args = items[1..]
            .iter()
            .map(Expr::parse)
            .collect::<Result<Vec<_>>>()?;
        Ok(Expr::Op {
            name: head.clone(),
            args,
        })
    }

    pub fn to_value(&self) -> Value {
        match self {
            Expr::Field { target, options } => {
                let target = match target {
                    FieldTarget::Id(id) => Value::from(*id),
                    FieldTarget::Name(name) => Value::String(name.clone()),
                };
                let options = options.clone().map(Value::Object).unwrap_or(Value::Null);
                Value::Array(vec![Value::String("field".into()), target, options])
            }
            Expr::Literal(value) => value.clone(),
            Expr::Op { name, args } => {
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().map(Expr::to_value));
                Value::Array(items)
            }
        }
    }
}

fn parse_source_table(value: &Value) -> Result<SourceRef> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(SourceRef::Table)
            .ok_or_else(|| parse_error(format!("source-table is not an integer: {}", n))),
        Value::String(s) => parse_card_reference(s)
            .map(SourceRef::Card)
            .ok_or_else(|| parse_error(format!("unsupported source-table: {}", s))),
        other => Err(parse_error(format!("unsupported source-table: {}", other))),
    }
}

fn parse_clause(key: &str, value: &Value) -> Result<Vec<Expr>> {
    let Value::Array(items) = value else {
        return Err(parse_error(format!("{} must be an array", key)));
    };
    items.iter().map(Expr::parse).collect()
}

fn parse_error(message: impl Into<String>) -> BridgeError {
    BridgeError::QueryParse {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_models_id_bearing_keys() {
        let body = json!({
            "source-table": 10,
            "filter": ["and", ["=", ["field", 55, null], 5], ["not-null", ["field", 56, {"base-type": "type/Integer"}]]],
            "aggregation": [["count"]],
            "breakout": [["field", 56, {"temporal-unit": "month"}]],
            "fields": "all",
            "limit": 20
        });

        let query = StructuredQuery::parse(&body).unwrap();
        assert_eq!(query.source, Some(SourceRef::Table(10)));
        assert_eq!(query.extra.get("limit"), Some(&json!(20)));
        assert_eq!(query.extra.get("fields"), Some(&json!("all")));
        assert!(query.fields.is_none());

        let Some(Expr::Op { name, args }) = &query.filter else {
            panic!("filter should be an operator");
        };
        assert_eq!(name, "and");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_card_source_and_nested_query() {
        let body = json!({
            "source-query": {"source-table": "embedded-card:99", "limit": 5},
            "joins": [{
                "source-table": 11,
                "alias": "Events",
                "condition": ["=", ["field", 55, null], ["field", 60, {"join-alias": "Events"}]],
                "strategy": "left-join"
            }]
        });

        let query = StructuredQuery::parse(&body).unwrap();
        let Some(SourceRef::Query(inner)) = &query.source else {
            panic!("expected nested query");
        };
        assert_eq!(inner.source, Some(SourceRef::Card(99)));

        let joins = query.joins.as_ref().unwrap();
        assert_eq!(joins[0].alias.as_deref(), Some("Events"));
        assert_eq!(joins[0].query.source, Some(SourceRef::Table(11)));
        assert_eq!(joins[0].query.extra.get("strategy"), Some(&json!("left-join")));

        assert_eq!(query.to_value(), body);
    }

    #[test]
    fn test_field_by_name_and_literals() {
        let expr = Expr::parse(&json!(["contains", ["field", "title", {"base-type": "type/Text"}], "x"])).unwrap();
        let Expr::Op { args, .. } = &expr else {
            panic!("expected operator");
        };
        assert!(matches!(
            &args[0],
            Expr::Field {
                target: FieldTarget::Name(name),
                ..
            } if name == "title"
        ));
        assert_eq!(args[1], Expr::Literal(json!("x")));
    }

    #[test]
    fn test_malformed_bodies_are_rejected() {
        assert!(StructuredQuery::parse(&json!("select 1")).is_err());
        assert!(StructuredQuery::parse(&json!({"source-table": "card__5"})).is_err());
        assert!(StructuredQuery::parse(&json!({"filter": ["field", null, null]})).is_err());
        assert!(StructuredQuery::parse(&json!({"joins": {}})).is_err());
    }
}
