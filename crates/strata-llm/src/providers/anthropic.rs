use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use strata_core::config::ModelConfig;
use strata_core::error::{Result, StrataError};
use strata_core::traits::ReasoningClient;
use strata_core::types::ReasoningRequest;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    http: Client,
}

impl AnthropicClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for AnthropicClient {
    fn default() -> Self {
        Self::new()
    }
}

// Anthropic API request types
#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

// Anthropic API response types
#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl ReasoningClient for AnthropicClient {
    fn complete(&self, config: &ModelConfig, request: ReasoningRequest) -> BoxFuture<'_, Result<String>> {
        let config = config.clone();

        Box::pin(async move {
            let api_key = config
                .api_key
                .as_deref()
                .ok_or_else(|| StrataError::Config("Anthropic API key not set".into()))?;

            let base_url = config.base_url.as_deref().unwrap_or(ANTHROPIC_API_URL);

            let body = AnthropicRequest {
                model: config.model_id.clone(),
                max_tokens: config.max_tokens,
                temperature: if config.temperature > 0.0 {
                    Some(config.temperature)
                } else {
                    None
                },
                system: if request.system.is_empty() {
                    None
                } else {
                    Some(request.system)
                },
                messages: vec![ApiMessage {
                    role: "user".to_string(),
                    content: request.prompt,
                }],
            };

            let response = self
                .http
                .post(base_url)
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
                .map_err(|e| StrataError::Reasoning(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown error".to_string());
                return Err(StrataError::Reasoning(format!("HTTP {}: {}", status, body)));
            }

            let parsed: AnthropicResponse = response
                .json()
                .await
                .map_err(|e| StrataError::Reasoning(e.to_string()))?;

            let text: String = parsed
                .content
                .iter()
                .filter(|b| b.kind == "text")
                .map(|b| b.text.as_str())
                .collect();

            if text.is_empty() {
                return Err(StrataError::Reasoning("empty response body".into()));
            }

            Ok(text)
        })
    }
}
