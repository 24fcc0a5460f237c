//! Deterministic PostgreSQL to ClickHouse rewrites.
//!
//! These cover the constructs that show up in most native cards. Anything
//! the rules leave behind is caught by [`has_residual`] and routed to the
//! rewrite oracle. String literals and `{{placeholders}}` are never
//! rewritten.

use regex::{Captures, Regex};
use std::collections::HashSet;
use std::sync::LazyLock;

const CAST_TYPES: &str = concat!(
    r"double\s+precision|timestamp\s+with(?:out)?\s+time\s+zone|timestamptz|timestamp|",
    r"varchar|text|bigint|integer|int8|int4|int|float8|float|date"
);

/// Spans no rule may touch: string literals and `{{placeholders}}`.
pub(crate) const PROTECTED_SPANS: &str = r"'(?:[^']|'')*'|\{\{[^}]*\}\}";

/// `rule` or a protected span, whichever starts first. A match of the
/// `protected` group is put back unchanged by [`replace_code`].
fn guarded(rule: &str) -> String {
    format!(r"(?i)(?:{})|(?P<protected>{})", rule, PROTECTED_SPANS)
}

/// `CAST(<expr> AS <type>)` with a parenthesis-free expression.
static CAST_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&guarded(&format!(
        r"\bCAST\s*\(\s*([^()]+?)\s+AS\s+({})\s*\)",
        CAST_TYPES
    )))
    .unwrap()
});

/// `<operand>::<type>` where the operand is an identifier, number or string literal.
static SHORT_CAST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&guarded(&format!(
        r"('(?:[^']|'')*'|[A-Za-z_][\w.]*|\d+(?:\.\d+)?)\s*::\s*({})\b",
        CAST_TYPES
    )))
    .unwrap()
});

static DATE_TRUNC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&guarded(r"\bdate_trunc\s*\(\s*'(\w+)'\s*,\s*([^()]+?)\s*\)")).unwrap()
});

static CHAR_LENGTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&guarded(r"\b(?:char_length|character_length)\s*\(")).unwrap()
});
static STRPOS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&guarded(r"\bstrpos\s*\(")).unwrap());
static SUBSTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&guarded(r"\bsubstr\s*\(")).unwrap());
static RANDOM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&guarded(r"\brandom\s*\(\s*\)")).unwrap());
static CURRENT_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&guarded(r"\bcurrent_date\b(?:\s*\(\s*\))?")).unwrap());

static FUNCTION_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap());
static STRING_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'(?:[^']|'')*'").unwrap());
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{[^}]*\}\}").unwrap());

/// Function names and keywords that read the same in the target dialect.
static COMPATIBLE_CALLS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // keywords that can precede a parenthesis
        "select", "from", "where", "join", "on", "using", "in", "exists", "as", "and", "or",
        "not", "with", "values", "over", "filter", "when", "then", "else", "case", "any", "all",
        "union", "interval", "by", "is", "like", "between", "distinct",
        // aggregates and scalar functions shared by both dialects
        "count", "sum", "avg", "min", "max", "coalesce", "nullif", "round", "floor", "ceil",
        "abs", "lower", "upper", "trim", "length", "concat", "substring", "position", "replace",
        "now", "extract", "cast", "greatest", "least", "if", "row_number", "rank", "dense_rank",
        "lag", "lead", "sqrt", "exp", "ln", "log", "power", "mod",
        // target functions emitted by the rules
        "todate", "todatetime", "tostring", "toint32", "toint64", "tofloat64", "tostartofminute",
        "tostartofhour", "tostartofday", "tomonday", "tostartofmonth", "tostartofquarter",
        "tostartofyear", "lengthutf8", "rand", "today",
    ]
    .into_iter()
    .collect()
});

fn cast_function(type_name: &str) -> &'static str {
    let normalized = type_name.to_ascii_lowercase();
    match normalized.split_whitespace().next().unwrap_or_default() {
        "date" => "toDate",
        "timestamp" | "timestamptz" => "toDateTime",
        "text" | "varchar" => "toString",
        "integer" | "int" | "int4" => "toInt32",
        "bigint" | "int8" => "toInt64",
        _ => "toFloat64",
    }
}

fn truncation_function(unit: &str) -> Option<&'static str> {
    Some(match unit.to_ascii_lowercase().as_str() {
        "minute" => "toStartOfMinute",
        "hour" => "toStartOfHour",
        "day" => "toStartOfDay",
        "week" => "toMonday",
        "month" => "toStartOfMonth",
        "quarter" => "toStartOfQuarter",
        "year" => "toStartOfYear",
        _ => return None,
    })
}

/// Replace every match of a [`guarded`] rule, leaving protected spans alone.
fn replace_code(rule: &Regex, text: &str, rewrite: impl Fn(&Captures) -> String) -> String {
    rule.replace_all(text, |caps: &Captures| {
        if caps.name("protected").is_some() {
            caps[0].to_string()
        } else {
            rewrite(caps)
        }
    })
    .into_owned()
}

/// Apply every deterministic rule. Pure; the same input always gives the same output.
pub fn apply_deterministic_rules(text: &str) -> String {
    let text = replace_code(&CAST_CALL, text, |caps| {
        format!("{}({})", cast_function(&caps[2]), caps[1].trim())
    });
    let text = replace_code(&SHORT_CAST, &text, |caps| {
        format!("{}({})", cast_function(&caps[2]), &caps[1])
    });
    let text = replace_code(&DATE_TRUNC, &text, |caps| match truncation_function(&caps[1]) {
        Some(function) => format!("{}({})", function, caps[2].trim()),
        None => caps[0].to_string(),
    });
    let text = replace_code(&CHAR_LENGTH, &text, |_| "lengthUTF8(".to_string());
    let text = replace_code(&STRPOS, &text, |_| "position(".to_string());
    let text = replace_code(&SUBSTR, &text, |_| "substring(".to_string());
    let text = replace_code(&RANDOM, &text, |_| "rand()".to_string());
    replace_code(&CURRENT_DATE, &text, |_| "today()".to_string())
}

/// Whether the text still contains something the rules could not translate.
///
/// Any call to a function outside the compatible set counts, and so does a
/// leftover `::` cast. String literals and `{{placeholders}}` are ignored.
pub fn has_residual(text: &str) -> bool {
    !residual_constructs(text).is_empty()
}

/// The untranslated constructs, for logging and prompts.
pub fn residual_constructs(text: &str) -> Vec<String> {
    let stripped = STRING_LITERAL.replace_all(text, "''");
    let stripped = PLACEHOLDER.replace_all(&stripped, "");

    let mut residual: Vec<String> = FUNCTION_CALL
        .captures_iter(&stripped)
        .map(|caps| caps[1].to_ascii_lowercase())
        .filter(|name| !COMPATIBLE_CALLS.contains(name.as_str()))
        .collect();
    if stripped.contains("::") {
        residual.push("::".to_string());
    }
    residual.sort();
    residual.dedup();
    residual
}
