//! Template tags of raw cards: card references and field filters.
//!
//! A raw body looks like `{"query": "...{{#99-orders}}...", "template-tags":
//! {...}}`. Card tags are renumbered through the card-id mapping; dimension
//! tags point at source fields and go through the resolver.

use super::query::{Expr, FieldTarget};
use crate::models::{CardId, UnmatchedField};
use crate::resolver::{Resolution, SchemaResolver};
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

const QUERY: &str = "query";
const TEMPLATE_TAGS: &str = "template-tags";
const CARD_ID: &str = "card-id";
const DIMENSION: &str = "dimension";

/// `{{#<id>-slug}}` split into prefix, id and the rest.
static CARD_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\{\{\s*#)(\d+)((?:-[^}]*)?\s*\}\})").unwrap());

/// A leading `#<id>` in a tag key or name.
static TAG_NAME_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#(\d+)").unwrap());

/// Raw body with tags rewritten, plus what could not be rewritten.
#[derive(Debug, Clone, PartialEq)]
pub struct TagRewrite {
    pub body: Value,
    pub unresolved_cards: Vec<CardId>,
    pub unmatched_fields: Vec<UnmatchedField>,
}

/// Rewrite card tags and dimension tags of a raw body.
pub fn rewrite_template_tags(
    body: &Value,
    card_map: &BTreeMap<CardId, CardId>,
    resolver: &SchemaResolver,
) -> TagRewrite {
    let mut body = body.clone();
    let mut unresolved = BTreeSet::new();
    let mut unmatched = BTreeMap::new();

    if let Some(Value::String(text)) = body.get(QUERY) {
        let renumbered = renumber_text(text, card_map, &mut unresolved);
        body[QUERY] = Value::String(renumbered);
    }

    if let Some(Value::Object(tags)) = body.get(TEMPLATE_TAGS) {
        let mut rewritten = Map::new();
        for (key, tag) in tags {
            let mut tag = tag.clone();
            let mut key = key.clone();

            if let Some(source_id) = tag.get(CARD_ID).and_then(Value::as_i64) {
                match card_map.get(&source_id) {
                    Some(&target_id) => {
                        tag[CARD_ID] = Value::from(target_id);
                        key = renumber_name(&key, target_id);
                        let renamed = tag
                            .get("name")
                            .and_then(Value::as_str)
                            .map(|name| renumber_name(name, target_id));
                        if let Some(name) = renamed {
                            tag["name"] = Value::String(name);
                        }
                    }
                    None => {
                        unresolved.insert(source_id);
                    }
                }
            }

            if let Some(dimension) = tag.get(DIMENSION) {
                if let Some(rewritten_dimension) = rewrite_dimension(dimension, resolver, &mut unmatched) {
                    tag[DIMENSION] = rewritten_dimension;
                }
            }

            rewritten.insert(key, tag);
        }
        body[TEMPLATE_TAGS] = Value::Object(rewritten);
    }

    TagRewrite {
        body,
        unresolved_cards: unresolved.into_iter().collect(),
        unmatched_fields: unmatched.into_values().collect(),
    }
}

fn renumber_text(
    text: &str,
    card_map: &BTreeMap<CardId, CardId>,
    unresolved: &mut BTreeSet<CardId>,
) -> String {
    CARD_TAG
        .replace_all(text, |caps: &Captures| {
            let mapped = caps[2]
                .parse::<CardId>()
                .ok()
                .and_then(|id| match card_map.get(&id) {
                    Some(target) => Some(*target),
                    None => {
                        unresolved.insert(id);
                        None
                    }
                });
            match mapped {
                Some(target) => format!("{}{}{}", &caps[1], target, &caps[3]),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn renumber_name(name: &str, target_id: CardId) -> String {
    TAG_NAME_ID
        .replace(name, format!("#{}", target_id).as_str())
        .into_owned()
}

/// Field filter dimension, or `None` when it needs no change.
fn rewrite_dimension(
    dimension: &Value,
    resolver: &SchemaResolver,
    unmatched: &mut BTreeMap<i64, UnmatchedField>,
) -> Option<Value> {
    let Ok(Expr::Field {
        target: FieldTarget::Id(source_id),
        options,
    }) = Expr::parse(dimension)
    else {
        return None;
    };

    match resolver.resolve_field(source_id) {
        Resolution::Matched { target_id, .. } => Some(
            Expr::Field {
                target: FieldTarget::Id(target_id),
                options,
            }
            .to_value(),
        ),
        Resolution::Unmatched(field) => {
            unmatched.insert(source_id, field);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldDescriptor, SchemaCatalog, TableDescriptor, TableMapping};
    use crate::store::{MappingStore, MemoryStore};
    use serde_json::json;
    use std::sync::Arc;

    fn resolver() -> SchemaResolver {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_table_mapping(&TableMapping::manual(10, "public.orders", 200, "default.orders"))
            .unwrap();
        let field = |id, table_id, name: &str| FieldDescriptor {
            id,
            table_id,
            name: name.to_string(),
            display_name: String::new(),
            base_type: String::new(),
        };
        let source = SchemaCatalog {
            system_id: 1,
            tables: vec![TableDescriptor {
                id: 10,
                schema: Some("public".into()),
                name: "orders".into(),
                display_name: String::new(),
                fields: vec![field(56, 10, "created_at"), field(57, 10, "legacy")],
            }],
        };
        let target = SchemaCatalog {
            system_id: 2,
            tables: vec![TableDescriptor {
                id: 200,
                schema: Some("default".into()),
                name: "orders".into(),
                display_name: String::new(),
                fields: vec![field(256, 200, "created_at")],
            }],
        };
        SchemaResolver::load(store, source, target).unwrap()
    }

    #[test]
    fn test_card_tags_are_renumbered() {
        let resolver = resolver();
        let body = json!({
            "query": "SELECT * FROM {{#99-active-users}} u JOIN {{#98}} x ON true",
            "template-tags": {
                "#99-active-users": {"name": "#99-active-users", "type": "card", "card-id": 99},
                "#98": {"name": "#98", "type": "card", "card-id": 98}
            }
        });
        let card_map = BTreeMap::from([(99, 1099)]);

        let result = rewrite_template_tags(&body, &card_map, &resolver);
        assert_eq!(
            result.body["query"],
            "SELECT * FROM {{#1099-active-users}} u JOIN {{#98}} x ON true"
        );
        let tags = result.body["template-tags"].as_object().unwrap();
        assert_eq!(tags["#1099-active-users"]["card-id"], 1099);
        assert_eq!(tags["#1099-active-users"]["name"], "#1099-active-users");
        assert_eq!(tags["#98"]["card-id"], 98);
        assert_eq!(result.unresolved_cards, vec![98]);
    }

    #[test]
    fn test_dimension_tags_are_resolved() {
        let resolver = resolver();
        let body = json!({
            "query": "SELECT count(*) FROM orders WHERE {{created}} AND {{legacy}}",
            "template-tags": {
                "created": {"type": "dimension", "dimension": ["field", 56, null], "widget-type": "date/all-options"},
                "legacy": {"type": "dimension", "dimension": ["field", 57, null]}
            }
        });

        let result = rewrite_template_tags(&body, &BTreeMap::new(), &resolver);
        assert_eq!(
            result.body["template-tags"]["created"]["dimension"],
            json!(["field", 256, null])
        );
        assert_eq!(result.unmatched_fields.len(), 1);
        assert_eq!(result.unmatched_fields[0].label(), "public.orders.legacy");
        assert!(result.unresolved_cards.is_empty());
    }
}
