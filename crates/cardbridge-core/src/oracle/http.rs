//! OpenAI-compatible chat-completions oracle.

use super::prompt::SYSTEM_MESSAGE;
use super::RewriteOracle;
use crate::config::OracleConfig;
use crate::error::{BridgeError, Result};
use crate::network::HttpClient;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

/// Oracle backed by a `/chat/completions` endpoint.
#[derive(Clone)]
pub struct ChatCompletionsOracle {
    http: HttpClient,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl std::fmt::Debug for ChatCompletionsOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsOracle")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl ChatCompletionsOracle {
    /// `endpoint` is the full completions URL.
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let endpoint = endpoint.into();
        url::Url::parse(&endpoint).map_err(|e| BridgeError::Config {
            message: format!("Invalid oracle endpoint {}: {}", endpoint, e),
        })?;

        Ok(Self {
            http: HttpClient::with_timeout(OracleConfig::REQUEST_TIMEOUT)?,
            endpoint,
            api_key,
            model: OracleConfig::DEFAULT_MODEL.to_string(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": SYSTEM_MESSAGE},
                {"role": "user", "content": prompt},
            ],
        })
    }
}

#[async_trait]
impl RewriteOracle for ChatCompletionsOracle {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut request = self
            .http
            .inner()
            .post(&self.endpoint)
            .json(&self.request_body(prompt));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = self.http.execute(request, &self.endpoint).await?;
        let payload: Value = response.json().await.map_err(|e| BridgeError::Oracle {
            message: format!("Unreadable completion response: {}", e),
        })?;

        let text = extract_completion(&payload)?;
        debug!("Oracle {} answered with {} chars", self.model, text.len());
        Ok(text)
    }
}

/// Pull the first choice's message content out of a completions payload.
pub fn extract_completion(payload: &Value) -> Result<String> {
    if let Some(error) = payload.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(BridgeError::Oracle { message });
    }

    payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BridgeError::Oracle {
            message: "completion response has no message content".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_completion() {
        let payload = json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "SELECT 1"}}]
        });
        assert_eq!(extract_completion(&payload).unwrap(), "SELECT 1");
    }

    #[test]
    fn test_extract_completion_errors() {
        let err = extract_completion(&json!({"error": {"message": "quota"}})).unwrap_err();
        assert!(err.to_string().contains("quota"));
        assert!(extract_completion(&json!({"choices": []})).is_err());
    }

    #[test]
    fn test_rejects_bad_endpoint() {
        let err = ChatCompletionsOracle::new("not a url", None).unwrap_err();
        assert!(matches!(err, BridgeError::Config { .. }));
    }

    #[test]
    fn test_request_body_carries_model_and_prompt() {
        let oracle = ChatCompletionsOracle::new("https://llm.example.com/v1/chat/completions", None)
            .unwrap()
            .with_model("sql-small");
        let body = oracle.request_body("translate me");
        assert_eq!(body["model"], "sql-small");
        assert_eq!(body["messages"][1]["content"], "translate me");
    }
}
