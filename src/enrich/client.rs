use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ArchError, Result};

/// Connection settings for an OpenAI-compatible chat endpoint.
#[derive(Debug, Clone)]
pub struct ChatClientConfig {
    pub model: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

pub struct ChatClient {
    config: ChatClientConfig,
    http: reqwest::Client,
}

impl ChatClient {
    pub fn new(config: ChatClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ArchError::Enrichment(format!("failed to build http client: {}", e)))?;

        Ok(Self { config, http })
    }

    /// One non-streaming completion; returns the trimmed text of the first choice.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        if messages.is_empty() {
            return Err(ArchError::Enrichment(
                "chat completion requires at least one message".to_string(),
            ));
        }

        let payload = ChatCompletionsRequest {
            model: self.config.model.clone(),
            messages: messages.to_vec(),
            temperature: Some(0.0),
            stream: Some(false),
        };

        let mut request = self.http.post(self.chat_completions_url()).json(&payload);
        if let Some(api_key) = self.config.api_key.as_ref() {
            request = request.bearer_auth(api_key);
        }
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ArchError::Enrichment(format!(
                    "inference request timed out after {:?} (model={})",
                    self.config.timeout, self.config.model
                ))
            } else {
                ArchError::Enrichment(format!(
                    "inference request failed (model={}): {}",
                    self.config.model, e
                ))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ArchError::Enrichment(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(ArchError::Enrichment(format!(
                "inference endpoint returned HTTP {}: {}",
                status,
                truncate_for_error(&body)
            )));
        }

        let text = parse_completion(&body)?;
        debug!("Completion received: {} chars", text.len());
        Ok(text)
    }

    fn chat_completions_url(&self) -> String {
        let endpoint = self.config.endpoint.trim().trim_end_matches('/');
        if endpoint.ends_with("/chat/completions") {
            endpoint.to_string()
        } else if endpoint.ends_with("/v1") {
            format!("{}/chat/completions", endpoint)
        } else {
            format!("{}/v1/chat/completions", endpoint)
        }
    }
}

fn parse_completion(body: &str) -> Result<String> {
    let parsed: ChatCompletionsResponse = serde_json::from_str(body).map_err(|e| {
        ArchError::Enrichment(format!(
            "invalid JSON from inference endpoint: {} (body={})",
            e,
            truncate_for_error(body)
        ))
    })?;

    parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ArchError::Enrichment("response had no choices".to_string()))?
        .message
        .content
        .into_text()
        .ok_or_else(|| ArchError::Enrichment("response had empty message content".to_string()))
}

fn truncate_for_error(value: &str) -> String {
    const LIMIT: usize = 400;
    if value.len() <= LIMIT {
        return value.to_string();
    }
    let mut end = LIMIT;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &value[..end])
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: ChatContent,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChatContent {
    Text(String),
    Parts(Vec<ChatContentPart>),
}

impl ChatContent {
    fn into_text(self) -> Option<String> {
        let text = match self {
            ChatContent::Text(text) => text.trim().to_string(),
            ChatContent::Parts(parts) => parts
                .into_iter()
                .filter_map(|p| p.text)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatContentPart {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(endpoint: &str) -> ChatClient {
        ChatClient::new(ChatClientConfig {
            model: "test-model".to_string(),
            endpoint: endpoint.to_string(),
            api_key: None,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_chat_completions_url() {
        assert_eq!(
            client("http://localhost:11434/v1").chat_completions_url(),
            "http://localhost:11434/v1/chat/completions"
        );
        assert_eq!(
            client("https://api.example.com/").chat_completions_url(),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            client("http://h/v1/chat/completions").chat_completions_url(),
            "http://h/v1/chat/completions"
        );
    }

    #[test]
    fn test_parse_completion_text_and_parts() {
        let text = r#"{"choices":[{"message":{"content":"  {\"a\": 1} "}}]}"#;
        assert_eq!(parse_completion(text).unwrap(), "{\"a\": 1}");

        let parts = r#"{"choices":[{"message":{"content":[{"text":"one"},{"type":"x"},{"text":" two "}]}}]}"#;
        assert_eq!(parse_completion(parts).unwrap(), "one\ntwo");
    }

    #[test]
    fn test_parse_completion_errors() {
        assert!(parse_completion("not json").is_err());
        assert!(parse_completion(r#"{"choices":[]}"#).is_err());
        assert!(parse_completion(r#"{"choices":[{"message":{"content":"   "}}]}"#).is_err());
    }

    #[test]
    fn test_truncate_for_error_respects_char_boundaries() {
        let long = "é".repeat(300);
        let truncated = truncate_for_error(&long);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= 403);
    }

    #[tokio::test]
    async fn test_complete_rejects_empty_messages() {
        let err = client("http://localhost:1").complete(&[]).await.unwrap_err();
        assert!(matches!(err, ArchError::Enrichment(_)));
    }
}
