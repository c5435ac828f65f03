
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{ChatTurn, LanguageModel};
use crate::config::LlmConfig;
use crate::{RagError, Result};

/// Longest slice of an error body echoed back in messages
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Blocking client for the Mistral chat-completions API.
///
/// There is no retry: a failed call fails the question.
#[derive(Debug, Clone)]
pub struct MistralClient {
    api_url: String,
    api_key: Option<String>,
    model: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl MistralClient {
    #[inline]
    pub fn new(config: &LlmConfig) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            api_url: config.api_url.clone(),
            api_key: config.resolved_api_key(),
            model: config.model.clone(),
            agent,
        }
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                RagError::Config(
                    "No Mistral API key configured; set MISTRAL_API_KEY or llm.api_key".to_string(),
                )
            })
    }
}

impl LanguageModel for MistralClient {
    #[inline]
    fn model_name(&self) -> &str {
        &self.model
    }

    #[inline]
    fn ensure_configured(&self) -> Result<()> {
        self.api_key().map(|_| ())
    }

    fn complete(&self, turns: &[ChatTurn], temperature: f32) -> Result<String> {
        let api_key = self.api_key()?;

        let request = CompletionRequest {
            model: &self.model,
            messages: turns,
            temperature,
        };
        let request_json = serde_json::to_string(&request).map_err(|e| {
            RagError::LanguageModel(format!("Failed to serialize completion request: {}", e))
        })?;

        debug!(
            "Requesting completion from {} with {} messages",
            self.model,
            turns.len()
        );

        let mut response = self
            .agent
            .post(self.api_url.as_str())
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .send(&request_json)
            .map_err(|e| RagError::Network(format!("Completion request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| RagError::Network(format!("Failed to read completion response: {}", e)))?;

        if !status.is_success() {
            let excerpt: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            warn!("Completion request returned HTTP {}", status.as_u16());
            return Err(RagError::LanguageModel(format!(
                "HTTP {}: {}",
                status.as_u16(),
                excerpt
            )));
        }

        let parsed: CompletionResponse = serde_json::from_str(&body).map_err(|e| {
            RagError::LanguageModel(format!("Failed to parse completion response: {}", e))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| RagError::LanguageModel("Completion had no choices".to_string()))
    }
}
