//! Identifier normalization for name-based matching.

use regex::Regex;
use std::sync::LazyLock;

/// Runs of whitespace, underscores and hyphens.
static SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s_\-]+").unwrap());

/// Reduce an identifier or display name to its comparable core.
///
/// Case is folded and separators are dropped, so `cust_id`, `Cust Id` and
/// `CUST-ID` all normalize to `custid`.
///
/// ```
/// use cardbridge_core::resolver::normalize_identifier;
///
/// assert_eq!(normalize_identifier("Cust Id"), "custid");
/// assert_eq!(normalize_identifier("order_created_at"), "ordercreatedat");
/// ```
pub fn normalize_identifier(name: &str) -> String {
    SEPARATORS.replace_all(name.trim(), "").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separators_and_case() {
        assert_eq!(normalize_identifier("cust_id"), "custid");
        assert_eq!(normalize_identifier("Cust Id"), "custid");
        assert_eq!(normalize_identifier("CUST-ID"), "custid");
        assert_eq!(normalize_identifier("  total__amount "), "totalamount");
    }

    #[test]
    fn test_dots_are_kept() {
        assert_eq!(normalize_identifier("public.orders"), "public.orders");
    }

    #[test]
    fn test_empty() {
        assert_eq!(normalize_identifier("   "), "");
    }
}
