//! Prompts sent to the rewrite oracle and cleanup of its answers.

use crate::config::OracleConfig;
use crate::rewrite::SchemaContext;
use std::fmt::Write;

/// System message for chat-style oracles.
pub const SYSTEM_MESSAGE: &str =
    "You translate SQL between dialects. Reply with the query only, no commentary.";

fn describe_context(out: &mut String, ctx: &SchemaContext) {
    let _ = writeln!(
        out,
        "Source dialect: {}. Target dialect: {}.",
        ctx.source_dialect.display_name(),
        ctx.target_dialect.display_name()
    );
    if !ctx.table_renames.is_empty() {
        out.push_str("Table renames (source -> target):\n");
        for (from, to) in &ctx.table_renames {
            let _ = writeln!(out, "  {} -> {}", from, to);
        }
    }
    if !ctx.target_tables.is_empty() {
        let _ = writeln!(out, "Target tables: {}", ctx.target_tables.join(", "));
    }
}

fn rules(out: &mut String) {
    out.push_str("Rules:\n");
    out.push_str("- Keep every {{placeholder}} and [[optional clause]] marker exactly as written.\n");
    out.push_str("- Keep column aliases and result column order.\n");
    let _ = writeln!(
        out,
        "- If the query cannot be translated faithfully, reply with exactly {}.",
        OracleConfig::FAILURE_SENTINEL
    );
}

/// Prompt asking for a full translation of `text`.
pub fn translation_prompt(text: &str, ctx: &SchemaContext, residual: &[String]) -> String {
    let mut out = String::new();
    describe_context(&mut out, ctx);
    if !residual.is_empty() {
        let _ = writeln!(out, "Constructs needing translation: {}", residual.join(", "));
    }
    rules(&mut out);
    out.push_str("\nQuery:\n");
    out.push_str(text);
    out.push('\n');
    out
}

/// Prompt asking to fix a translation the target rejected.
pub fn repair_prompt(original: &str, current: &str, error: &str, ctx: &SchemaContext) -> String {
    let mut out = String::new();
    describe_context(&mut out, ctx);
    rules(&mut out);
    out.push_str("\nOriginal query:\n");
    out.push_str(original);
    out.push_str("\n\nCurrent translation:\n");
    out.push_str(current);
    out.push_str("\n\nThe target database rejected it with:\n");
    out.push_str(error);
    out.push_str("\n\nReply with a corrected translation.\n");
    out
}

/// Strip code fences and surrounding whitespace from an oracle answer.
pub fn clean_response(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // Drop the language tag on the opening fence.
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
        .to_string()
}

/// Whether the oracle declined to translate.
pub fn is_refusal(response: &str) -> bool {
    response.contains(OracleConfig::FAILURE_SENTINEL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Dialect;

    #[test]
    fn test_clean_response() {
        assert_eq!(clean_response("  SELECT 1  "), "SELECT 1");
        assert_eq!(clean_response("```sql\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(clean_response("```\nSELECT 1\nFROM t\n```\n"), "SELECT 1\nFROM t");
    }

    #[test]
    fn test_refusal() {
        assert!(is_refusal("UNTRANSLATABLE"));
        assert!(!is_refusal("SELECT 1"));
    }

    #[test]
    fn test_translation_prompt_mentions_context() {
        let mut ctx = SchemaContext::new(Dialect::Postgres, Dialect::ClickHouse);
        ctx.table_renames
            .insert("public.orders".into(), "default.orders".into());
        let prompt = translation_prompt("SELECT to_char(ts, 'YYYY')", &ctx, &["to_char".into()]);
        assert!(prompt.contains("PostgreSQL"));
        assert!(prompt.contains("public.orders -> default.orders"));
        assert!(prompt.contains("to_char"));
        assert!(prompt.contains(OracleConfig::FAILURE_SENTINEL));
        assert!(prompt.ends_with("SELECT to_char(ts, 'YYYY')\n"));
    }
}
