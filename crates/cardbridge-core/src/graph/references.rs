//! Card reference discovery inside query bodies.

use crate::models::CardId;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Prefix of the string sentinel a structured query uses to read from another card.
pub const CARD_REFERENCE_PREFIX: &str = "embedded-card:";

/// `embedded-card:<id>` anywhere inside a string.
static EMBEDDED_CARD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"embedded-card:(\d+)").unwrap());

/// `{{#<id>}}` or `{{#<id>-slug}}` template tags in raw query text.
static CARD_TEMPLATE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*#(\d+)(?:-[^}]*)?\s*\}\}").unwrap());

/// Sentinel string for a reference to `card_id`.
pub fn card_reference(card_id: CardId) -> String {
    format!("{}{}", CARD_REFERENCE_PREFIX, card_id)
}

/// Parse an exact `embedded-card:<id>` sentinel.
pub fn parse_card_reference(value: &str) -> Option<CardId> {
    value
        .strip_prefix(CARD_REFERENCE_PREFIX)
        .and_then(|rest| rest.parse().ok())
}

/// Collect every card id referenced anywhere in `body`.
///
/// Walks objects, arrays and strings; anything that does not match a
/// reference pattern is skipped, so malformed bodies simply yield fewer ids.
pub fn extract_references(body: &Value) -> BTreeSet<CardId> {
    let mut found = BTreeSet::new();
    collect(body, &mut found);
    found
}

fn collect(value: &Value, found: &mut BTreeSet<CardId>) {
    match value {
        Value::String(s) => {
            for pattern in [&*EMBEDDED_CARD, &*CARD_TEMPLATE_TAG] {
                found.extend(
                    pattern
                        .captures_iter(s)
                        .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse::<CardId>().ok())),
                );
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect(v, found)),
        Value::Object(map) => {
            // Template-tag definitions name their card explicitly.
            if let Some(id) = map.get("card-id").and_then(Value::as_i64) {
                found.insert(id);
            }
            map.values().for_each(|v| collect(v, found));
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}
