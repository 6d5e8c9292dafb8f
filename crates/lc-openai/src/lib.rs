//! OpenAI adapter (chat completions).
//!
//! Implements the classifier's `CompletionService` over `/v1/chat/completions`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use lc_core::{errors::Error, ports::CompletionService, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
/// Prompt ceiling in characters; well under the model context window.
pub const DEFAULT_PROMPT_CEILING: usize = 100_000;

#[derive(Clone, Debug)]
pub struct OpenAiClient {
    api_key: String,
    model: String,
    base_url: String,
    prompt_ceiling: usize,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::External(format!("openai client build error: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            prompt_ceiling: DEFAULT_PROMPT_CEILING,
            http,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_prompt_ceiling(mut self, chars: usize) -> Self {
        self.prompt_ceiling = chars;
        self
    }

    fn request_body(&self, prompt: &str, max_tokens: u32) -> Value {
        json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": max_tokens,
        })
    }
}

#[async_trait]
impl CompletionService for OpenAiClient {
    fn prompt_ceiling(&self) -> usize {
        self.prompt_ceiling
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        if prompt.chars().count() > self.prompt_ceiling {
            return Err(Error::Classification(format!(
                "prompt exceeds {} chars",
                self.prompt_ceiling
            )));
        }

        let resp = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt, max_tokens))
            .send()
            .await
            .map_err(|e| Error::External(format!("openai request error: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = retry_after(resp.headers());
            tracing::warn!(?retry_after, "openai rate limited");
            return Err(Error::RateLimited { retry_after });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "openai completion failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let v: Value = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("openai json error: {e}")))?;
        let text = completion_text(&v)?;
        tracing::debug!(chars = text.len(), "completion received");
        Ok(text)
    }
}

/// Text of the first choice. An empty answer is returned as-is.
fn completion_text(v: &Value) -> Result<String> {
    if let Some(err) = v.get("error") {
        let msg = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(Error::External(format!("openai error: {msg}")));
    }
    v.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .ok_or_else(|| Error::External("openai response has no choices".to_string()))
}

/// `retry-after` in seconds, defaulting to one second.
fn retry_after(headers: &reqwest::header::HeaderMap) -> Duration {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or(Duration::from_secs(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

    #[test]
    fn reads_first_choice() {
        let v = json!({
            "choices": [
                { "message": { "role": "assistant", "content": "  General\n" } },
                { "message": { "role": "assistant", "content": "Other" } }
            ]
        });
        assert_eq!(completion_text(&v).unwrap(), "General");
    }

    #[test]
    fn api_errors_surface() {
        let v = json!({ "error": { "message": "bad key" } });
        let err = completion_text(&v).unwrap_err();
        assert!(err.to_string().contains("bad key"));
        assert!(completion_text(&json!({ "choices": [] })).is_err());
    }

    #[test]
    fn retry_after_header_is_honoured() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), Duration::from_secs(1));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("2.5"));
        assert_eq!(retry_after(&headers), Duration::from_millis(2500));
    }

    #[test]
    fn request_names_model_and_budget() {
        let c = OpenAiClient::new("k", "gpt-4o-mini").unwrap();
        let body = c.request_body("hi", 100);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["messages"][0]["content"], "hi");
    }

    #[tokio::test]
    async fn oversized_prompt_is_rejected_locally() {
        let c = OpenAiClient::new("k", "m")
            .unwrap()
            .with_base_url("http://127.0.0.1:9")
            .with_prompt_ceiling(4);
        let err = c.complete("too long", 10).await.unwrap_err();
        assert!(matches!(err, Error::Classification(_)));
    }
}
