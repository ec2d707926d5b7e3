use anyhow::{anyhow, Result};
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::GeminiConfig;

/// Thin client for the AI provider's generate-content API; the chat endpoint
/// proxies straight through it.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub async fn chat(&self, message: &str, context: Option<&str>) -> Result<String> {
        let prompt = match context {
            Some(context) => format!("{context}\n\n{message}"),
            None => message.to_string(),
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.config.api_url, self.config.model, self.config.api_key
        );

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "contents": [{ "parts": [{ "text": prompt }] }]
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!("AI provider request failed: {}", error_text));
        }

        let body: Value = response.json().await?;
        extract_reply(&body).ok_or_else(|| anyhow!("AI provider returned no candidates"))
    }
}

fn extract_reply(body: &Value) -> Option<String> {
    body.get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_extraction() {
        let body = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Hello, learner!" }] }
            }]
        });
        assert_eq!(extract_reply(&body), Some("Hello, learner!".to_string()));
        assert_eq!(extract_reply(&json!({ "candidates": [] })), None);
        assert_eq!(extract_reply(&json!({})), None);
    }
}
