//! Text-generation transport
//!
//! The `Transport` trait is the seam between the plan client and whichever
//! provider answers prompts. `GeminiTransport` speaks the Gemini
//! `generateContent` REST API.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client as ReqwestClient, Error as ReqwestError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-3-pro-preview";

/// Environment variable holding the provider API key
pub const API_KEY_ENV: &str = "API_KEY";

/// Provider configuration
#[derive(Debug, Clone)]
pub struct AiConfig {
    /// Not validated up front; a missing key fails the first call instead
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    /// Per-request timeout; `None` leaves it to the provider
    pub request_timeout: Option<Duration>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: None,
        }
    }
}

/// Errors talking to the text-generation service
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("no API key configured (set API_KEY)")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(#[from] ReqwestError),

    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("service returned no text")]
    EmptyResponse,

    #[error("malformed model output: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single prompt for the provider
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub thinking_budget: Option<u32>,
    /// When set, the reply must be JSON matching this schema
    pub response_schema: Option<Value>,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            thinking_budget: None,
            response_schema: None,
        }
    }

    pub fn with_thinking_budget(mut self, budget: u32) -> Self {
        self.thinking_budget = Some(budget);
        self
    }

    pub fn with_json_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }
}

/// Sends a prompt and returns the model's text reply
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<String, AiError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody {
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

impl GenerateContentBody {
    fn from_request(request: GenerateRequest) -> Self {
        let generation_config = GenerationConfig {
            thinking_config: request
                .thinking_budget
                .map(|thinking_budget| ThinkingConfig { thinking_budget }),
            response_mime_type: request
                .response_schema
                .as_ref()
                .map(|_| "application/json"),
            response_schema: request.response_schema,
        };

        Self {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart {
                    text: request.prompt,
                }],
            }],
            generation_config,
        }
    }
}

// Joins the first candidate's answer parts, skipping thought summaries
fn extract_text(response: GenerateContentResponse) -> Result<String, AiError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter(|part| !part.thought)
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(AiError::EmptyResponse);
    }
    Ok(text)
}

/// Gemini `generateContent` over HTTPS
#[derive(Debug, Clone)]
pub struct GeminiTransport {
    http_client: Arc<ReqwestClient>,
    config: AiConfig,
}

impl GeminiTransport {
    pub fn new(config: AiConfig) -> Result<Self, AiError> {
        let mut builder = ReqwestClient::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http_client: Arc::new(builder.build()?),
            config,
        })
    }
}

#[async_trait::async_trait]
impl Transport for GeminiTransport {
    async fn generate(&self, request: GenerateRequest) -> Result<String, AiError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(AiError::MissingApiKey)?;

        let url = format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            request.model
        );
        tracing::debug!(model = %request.model, structured = request.response_schema.is_some(), "sending generateContent request");

        let body = GenerateContentBody::from_request(request);
        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateContentResponse = response.json().await?;
        extract_text(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_structured_request_body() {
        let request = GenerateRequest::new("m", "hello")
            .with_thinking_budget(8000)
            .with_json_schema(json!({"type": "OBJECT"}));
        let body = serde_json::to_value(GenerateContentBody::from_request(request)).unwrap();

        assert_eq!(
            body,
            json!({
                "contents": [{"role": "user", "parts": [{"text": "hello"}]}],
                "generationConfig": {
                    "thinkingConfig": {"thinkingBudget": 8000},
                    "responseMimeType": "application/json",
                    "responseSchema": {"type": "OBJECT"}
                }
            })
        );
    }

    #[test]
    fn test_free_text_request_body() {
        let request = GenerateRequest::new("m", "summarize");
        let body = serde_json::to_value(GenerateContentBody::from_request(request)).unwrap();

        assert_eq!(body["generationConfig"], json!({}));
    }

    #[test]
    fn test_extract_text_skips_thoughts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"text": "planning...", "thought": true},
                        {"text": "{\"plans\":"},
                        {"text": "[]}"}
                    ]
                }
            }]
        }))
        .unwrap();

        assert_eq!(extract_text(response).unwrap(), "{\"plans\":[]}");
    }

    #[test]
    fn test_extract_text_without_candidates() {
        let response: GenerateContentResponse = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(extract_text(response), Err(AiError::EmptyResponse)));
    }

    #[tokio::test]
    async fn test_missing_key_fails_at_call_time() {
        let transport = GeminiTransport::new(AiConfig::default()).unwrap();
        let result = transport.generate(GenerateRequest::new("m", "p")).await;

        assert!(matches!(result, Err(AiError::MissingApiKey)));
    }
}
