//! Query rewrite engine.
//!
//! Structured bodies are parsed into [`StructuredQuery`] and have their ids
//! swapped through the [`SchemaResolver`](crate::resolver::SchemaResolver).
//! Raw text goes through deterministic dialect rules and, only for what
//! they leave behind, the rewrite oracle via [`TextRewriter`].

mod context;
mod query;
mod rules;
mod structured;
mod tags;
mod text;

pub use context::{translation_key, SchemaContext};
pub use query::{Expr, FieldTarget, Join, SourceRef, StructuredQuery};
pub use rules::{apply_deterministic_rules, has_residual, residual_constructs};
pub use structured::{StructuredRewrite, StructuredRewriter};
pub use tags::{rewrite_template_tags, TagRewrite};
pub use text::{missing_placeholders, placeholders, TextRewriter};
