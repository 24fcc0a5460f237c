//! Schema context handed to the text rewrite path.

use super::rules::PROTECTED_SPANS;
use crate::config::Dialect;
use regex::{Captures, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// What the text path knows about the two schemas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaContext {
    pub source_dialect: Dialect,
    pub target_dialect: Dialect,
    /// Qualified source table name to qualified target table name.
    pub table_renames: BTreeMap<String, String>,
    /// Qualified names of every target table.
    pub target_tables: Vec<String>,
}

impl SchemaContext {
    pub fn new(source_dialect: Dialect, target_dialect: Dialect) -> Self {
        Self {
            source_dialect,
            target_dialect,
            table_renames: BTreeMap::new(),
            target_tables: Vec::new(),
        }
    }

    /// Stable textual form; part of every translation cache key.
    pub fn fingerprint(&self) -> String {
        let renames: Vec<String> = self
            .table_renames
            .iter()
            .map(|(from, to)| format!("{}={}", from, to))
            .collect();
        format!(
            "{}>{}|{}|{}",
            self.source_dialect,
            self.target_dialect,
            renames.join(","),
            self.target_tables.join(",")
        )
    }

    /// Replace qualified source table names with their target names.
    ///
    /// Longer names go first so `public.orders_archive` is not clobbered by a
    /// rename of `public.orders`. String literals and placeholders are kept.
    pub fn rename_tables(&self, text: &str) -> String {
        let mut renames: Vec<(&String, &String)> = self.table_renames.iter().collect();
        renames.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));

        let mut result = text.to_string();
        for (from, to) in renames {
            let Ok(pattern) = table_pattern(from) else {
                continue;
            };
            result = pattern
                .replace_all(&result, |caps: &Captures| {
                    if caps.name("protected").is_some() {
                        caps[0].to_string()
                    } else {
                        to.clone()
                    }
                })
                .into_owned();
        }
        result
    }
}

fn table_pattern(name: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&format!(
        r"\b{}\b|(?P<protected>{})",
        regex::escape(name),
        PROTECTED_SPANS
    ))
        .case_insensitive(true)
        .build()
}

/// Cache key for a translation: sha256 over the text and the context.
pub fn translation_key(text: &str, ctx: &SchemaContext) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update([0u8]);
    hasher.update(ctx.fingerprint().as_bytes());
    hex::encode(hasher.finalize())
}
