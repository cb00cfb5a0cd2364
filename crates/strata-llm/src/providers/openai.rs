use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use strata_core::config::ModelConfig;
use strata_core::error::{Result, StrataError};
use strata_core::traits::ReasoningClient;
use strata_core::types::ReasoningRequest;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Client for the OpenAI chat completions API and compatible endpoints
/// (OpenRouter, local gateways) selected via `base_url`.
pub struct OpenAiClient {
    http: Client,
}

impl OpenAiClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct OaiMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ReasoningClient for OpenAiClient {
    fn complete(&self, config: &ModelConfig, request: ReasoningRequest) -> BoxFuture<'_, Result<String>> {
        let config = config.clone();

        Box::pin(async move {
            let base_url = config.base_url.as_deref().unwrap_or(OPENAI_API_URL);

            let mut messages = Vec::new();
            if !request.system.is_empty() {
                messages.push(OaiMessage {
                    role: "system".to_string(),
                    content: request.system,
                });
            }
            messages.push(OaiMessage {
                role: "user".to_string(),
                content: request.prompt,
            });

            let body = ChatRequest {
                model: config.model_id.clone(),
                messages,
                max_tokens: config.max_tokens,
                temperature: if config.temperature > 0.0 {
                    Some(config.temperature)
                } else {
                    None
                },
            };

            let mut req = self
                .http
                .post(base_url)
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .json(&body);

            if let Some(api_key) = &config.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            let response = req
                .send()
                .await
                .map_err(|e| StrataError::Reasoning(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(StrataError::Reasoning(format!("HTTP {}: {}", status, body)));
            }

            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| StrataError::Reasoning(e.to_string()))?;

            parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .filter(|text| !text.is_empty())
                .ok_or_else(|| StrataError::Reasoning("empty response body".into()))
        })
    }
}
