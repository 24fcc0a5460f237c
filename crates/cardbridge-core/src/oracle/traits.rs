use crate::error::Result;
use async_trait::async_trait;

/// Text-in, text-out rewrite service.
///
/// Only ever asked to translate or repair query text. Ids, mappings and
/// cycle detection never go through it.
#[async_trait]
pub trait RewriteOracle: Send + Sync {
    /// Short name for log lines.
    fn name(&self) -> &str {
        "oracle"
    }

    /// Answer a prompt. Rate limiting surfaces as `BridgeError::RateLimited`.
    async fn complete(&self, prompt: &str) -> Result<String>;
}
