//! Text path: deterministic rules first, the oracle only for what is left.

use super::context::{translation_key, SchemaContext};
use super::rules::{apply_deterministic_rules, residual_constructs};
use crate::config::OracleConfig;
use crate::error::{BridgeError, Result};
use crate::network::{retry_async, RetryConfig};
use crate::oracle::prompt::{clean_response, is_refusal, repair_prompt, translation_prompt};
use crate::oracle::RewriteOracle;
use crate::store::MappingStore;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info, warn};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^}]+?)\s*\}\}").unwrap());

/// Names of the `{{placeholders}}` in a query text.
pub fn placeholders(text: &str) -> BTreeSet<String> {
    PLACEHOLDER
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Placeholders of `original` that `candidate` dropped.
pub fn missing_placeholders(original: &str, candidate: &str) -> Vec<String> {
    let kept = placeholders(candidate);
    placeholders(original)
        .into_iter()
        .filter(|name| !kept.contains(name))
        .collect()
}

/// Translates raw query text between dialects.
pub struct TextRewriter {
    oracle: Arc<dyn RewriteOracle>,
    store: Arc<dyn MappingStore>,
    retry: RetryConfig,
    timeout: Duration,
}

impl TextRewriter {
    pub fn new(oracle: Arc<dyn RewriteOracle>, store: Arc<dyn MappingStore>) -> Self {
        Self {
            oracle,
            store,
            retry: RetryConfig::new()
                .with_max_attempts(OracleConfig::MAX_ATTEMPTS)
                .with_base_delay(OracleConfig::BASE_DELAY)
                .with_max_delay(OracleConfig::MAX_DELAY),
            timeout: OracleConfig::REQUEST_TIMEOUT,
        }
    }

    /// Backoff used when the oracle reports rate limiting.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Upper bound for one oracle call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Translate `original` into the target dialect.
    ///
    /// Fails with `TranslationFailed` when the oracle declines, errors out,
    /// or drops a placeholder.
    pub async fn rewrite_text(&self, original: &str, ctx: &SchemaContext) -> Result<String> {
        let prepared = apply_deterministic_rules(&ctx.rename_tables(original));
        let residual = residual_constructs(&prepared);
        if residual.is_empty() {
            debug!("Deterministic rules covered the whole query");
            return Ok(prepared);
        }

        let key = translation_key(original, ctx);
        if let Some(cached) = self.store.cached_translation(&key)? {
            debug!("Translation cache hit {}", &key[..12]);
            return Ok(cached);
        }

        info!(
            "Asking {} to translate residual constructs: {}",
            self.oracle.name(),
            residual.join(", ")
        );
        let prompt = translation_prompt(&prepared, ctx, &residual);
        let answer = self.ask(&prompt).await.map_err(|e| translation_failed(format!(
            "oracle call failed: {}",
            e
        )))?;

        let candidate = clean_response(&answer);
        if candidate.is_empty() || is_refusal(&candidate) {
            return Err(translation_failed("oracle declined to translate the query"));
        }
        let missing = missing_placeholders(original, &candidate);
        if !missing.is_empty() {
            return Err(translation_failed(format!(
                "oracle dropped placeholders: {}",
                missing.join(", ")
            )));
        }

        self.store.put_cached_translation(&key, &candidate)?;
        Ok(candidate)
    }

    /// Ask the oracle to fix a translation the target rejected.
    ///
    /// `None` when the oracle declines, repeats `current`, drops a
    /// placeholder, or fails.
    pub async fn repair_with_oracle(
        &self,
        original: &str,
        current: &str,
        error: &str,
        ctx: &SchemaContext,
    ) -> Option<String> {
        let prompt = repair_prompt(original, current, error, ctx);
        let answer = match self.ask(&prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Repair request failed: {}", e);
                return None;
            }
        };

        let candidate = clean_response(&answer);
        if candidate.is_empty() || is_refusal(&candidate) {
            debug!("Oracle declined to repair");
            return None;
        }
        if candidate.trim() == current.trim() {
            debug!("Oracle repeated the failing query");
            return None;
        }
        if !missing_placeholders(original, &candidate).is_empty() {
            warn!("Discarding repair that dropped placeholders");
            return None;
        }
        Some(candidate)
    }

    async fn ask(&self, prompt: &str) -> Result<String> {
        let oracle = &self.oracle;
        let timeout = self.timeout;

        let (result, stats) = retry_async(
            &self.retry,
            "oracle completion",
            move || async move {
                match tokio::time::timeout(timeout, oracle.complete(prompt)).await {
                    Ok(result) => result,
                    Err(_) => Err(BridgeError::Timeout(timeout)),
                }
            },
            |e: &BridgeError| e.is_rate_limited(),
        )
        .await;

        if stats.attempts > 1 {
            debug!(
                "Oracle call took {} attempts ({:?} waiting)",
                stats.attempts, stats.total_delay
            );
        }
        result
    }
}

fn translation_failed(message: impl Into<String>) -> BridgeError {
    BridgeError::TranslationFailed {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Dialect;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays canned answers and counts calls.
    struct CannedOracle {
        answers: Mutex<Vec<Result<String>>>,
        calls: AtomicU32,
    }

    impl CannedOracle {
        fn new(answers: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RewriteOracle for CannedOracle {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut answers = self.answers.lock().unwrap();
            if answers.is_empty() {
                return Err(BridgeError::Oracle {
                    message: "no more answers".into(),
                });
            }
            answers.remove(0)
        }
    }

    fn rate_limited() -> BridgeError {
        BridgeError::RateLimited {
            service: "llm".into(),
            retry_after_secs: None,
        }
    }

    fn rewriter(oracle: Arc<CannedOracle>) -> TextRewriter {
        TextRewriter::new(oracle, Arc::new(MemoryStore::new())).with_retry(RetryConfig::immediate(3))
    }

    fn ctx() -> SchemaContext {
        SchemaContext::new(Dialect::Postgres, Dialect::ClickHouse)
    }

    #[tokio::test]
    async fn test_rules_only_skip_oracle() {
        let oracle = CannedOracle::new(vec![]);
        let rewriter = rewriter(oracle.clone());

        let text = rewriter
            .rewrite_text("SELECT CAST(x AS date), date_trunc('day', ts) FROM t", &ctx())
            .await
            .unwrap();
        assert_eq!(text, "SELECT toDate(x), toStartOfDay(ts) FROM t");
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_oracle_result_is_cached() {
        let oracle = CannedOracle::new(vec![Ok("```sql\nSELECT formatDateTime(ts, '%Y') FROM t\n```".into())]);
        let rewriter = rewriter(oracle.clone());
        let original = "SELECT to_char(ts, 'YYYY') FROM t";

        let first = rewriter.rewrite_text(original, &ctx()).await.unwrap();
        let second = rewriter.rewrite_text(original, &ctx()).await.unwrap();
        assert_eq!(first, "SELECT formatDateTime(ts, '%Y') FROM t");
        assert_eq!(first, second);
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn test_rate_limits_are_retried() {
        let oracle = CannedOracle::new(vec![
            Err(rate_limited()),
            Err(rate_limited()),
            Ok("SELECT formatDateTime(ts, '%Y') FROM t".into()),
        ]);
        let rewriter = rewriter(oracle.clone());

        let text = rewriter
            .rewrite_text("SELECT to_char(ts, 'YYYY') FROM t", &ctx())
            .await
            .unwrap();
        assert!(text.starts_with("SELECT formatDateTime"));
        assert_eq!(oracle.calls(), 3);
    }

    #[tokio::test]
    async fn test_other_oracle_errors_are_not_retried() {
        let oracle = CannedOracle::new(vec![Err(BridgeError::Oracle {
            message: "bad key".into(),
        })]);
        let rewriter = rewriter(oracle.clone());

        let err = rewriter
            .rewrite_text("SELECT to_char(ts, 'YYYY') FROM t", &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::TranslationFailed { .. }));
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn test_sentinel_and_dropped_placeholders_fail() {
        let oracle = CannedOracle::new(vec![
            Ok(OracleConfig::FAILURE_SENTINEL.into()),
            Ok("SELECT formatDateTime(ts, '%Y') FROM t".into()),
        ]);
        let rewriter = rewriter(oracle);
        let original = "SELECT to_char(ts, 'YYYY') FROM t WHERE id = {{id}}";

        let refused = rewriter.rewrite_text(original, &ctx()).await.unwrap_err();
        assert!(refused.to_string().contains("declined"));

        let dropped = rewriter.rewrite_text(original, &ctx()).await.unwrap_err();
        assert!(dropped.to_string().contains("id"));
    }

    #[tokio::test]
    async fn test_repair_rejects_unchanged_and_refusals() {
        let oracle = CannedOracle::new(vec![
            Ok("SELECT a FROM t".into()),
            Ok(OracleConfig::FAILURE_SENTINEL.into()),
            Ok("SELECT b FROM t".into()),
        ]);
        let rewriter = rewriter(oracle);

        let ctx = ctx();
        assert_eq!(
            rewriter
                .repair_with_oracle("SELECT a FROM t", "SELECT a FROM t", "boom", &ctx)
                .await,
            None
        );
        assert_eq!(
            rewriter
                .repair_with_oracle("SELECT a FROM t", "SELECT a FROM t", "boom", &ctx)
                .await,
            None
        );
        assert_eq!(
            rewriter
                .repair_with_oracle("SELECT a FROM t", "SELECT a FROM t", "boom", &ctx)
                .await
                .as_deref(),
            Some("SELECT b FROM t")
        );
    }

    #[test]
    fn test_missing_placeholders() {
        assert_eq!(
            missing_placeholders("a = {{ start }} AND b = {{end}}", "a = {{start}}"),
            vec!["end".to_string()]
        );
        assert!(missing_placeholders("{{#12-orders}}", "{{#12-orders}}").is_empty());
    }
}
