//! Completions API client (Azure OpenAI deployments or OpenAI proper)

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::core::config::CompletionConfig;
use crate::core::errors::{DocChatError, Result};
use crate::core::models::{ApiType, UsageRecord};

/// Lowest temperature accepted
pub const MIN_TEMPERATURE: f32 = 0.1;
/// Highest temperature accepted
pub const MAX_TEMPERATURE: f32 = 1.0;

/// One completion call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub deployment: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(deployment: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            deployment: deployment.into(),
            prompt: prompt.into(),
            temperature: 0.7,
            max_tokens: 1000,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Check temperature and token limit before anything is sent
    pub fn validate(&self) -> Result<()> {
        if self.deployment.is_empty() {
            return Err(DocChatError::invalid_input("deployment must not be empty"));
        }
        if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&self.temperature) {
            return Err(DocChatError::invalid_input(format!(
                "temperature {} is outside {}..={}",
                self.temperature, MIN_TEMPERATURE, MAX_TEMPERATURE
            )));
        }
        if self.max_tokens == 0 {
            return Err(DocChatError::invalid_input("max_tokens must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionChoice {
    pub text: String,
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Completions response; `usage` is absent on some gateways
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub choices: Vec<CompletionChoice>,
    /// `None` when the counters are missing or do not have the expected shape
    #[serde(default, deserialize_with = "lenient_usage")]
    pub usage: Option<UsageRecord>,
}

fn lenient_usage<'de, D>(deserializer: D) -> std::result::Result<Option<UsageRecord>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match serde_json::from_value::<UsageRecord>(value) {
        Ok(usage) => Some(usage),
        Err(e) => {
            warn!("Ignoring malformed usage counters: {}", e);
            None
        }
    }))
}

impl CompletionResponse {
    /// First choice's text, trimmed
    pub fn reply_text(&self) -> Result<String> {
        self.choices
            .first()
            .map(|c| c.text.trim().to_string())
            .ok_or_else(|| DocChatError::invalid_response("completion returned no choices"))
    }
}

/// Sends prompts to the completions endpoint
#[derive(Debug, Clone)]
pub struct CompletionClient {
    client: reqwest::Client,
    config: CompletionConfig,
}

impl CompletionClient {
    /// Create a new completion client
    pub fn new(config: CompletionConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(DocChatError::config("completion API key is required"));
        }
        Url::parse(&config.api_base)
            .map_err(|e| DocChatError::config(format!("invalid completion API base '{}': {}", config.api_base, e)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self { client, config })
    }

    /// Deployment used when the caller does not pick one
    pub fn default_deployment(&self) -> &str {
        &self.config.default_deployment
    }

    /// Configured deployments
    pub fn config(&self) -> &CompletionConfig {
        &self.config
    }

    /// Completions URL for a deployment, with the name encoded as one path segment
    pub fn endpoint(&self, deployment: &str) -> Result<Url> {
        let mut url = Url::parse(&self.config.api_base)
            .map_err(|e| DocChatError::config(format!("invalid completion API base '{}': {}", self.config.api_base, e)))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| DocChatError::config("completion API base cannot be a base"))?;
            segments.pop_if_empty();
            match self.config.api_type {
                ApiType::Azure => {
                    segments.extend(["openai", "deployments", deployment, "completions"]);
                }
                ApiType::OpenAi => {
                    segments.push("completions");
                }
            }
        }
        Ok(url)
    }

    /// Run one completion
    pub async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        request.validate()?;

        let url = self.endpoint(&request.deployment)?;
        let mut body = serde_json::json!({
            "prompt": request.prompt,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let builder = match self.config.api_type {
            ApiType::Azure => self
                .client
                .post(url)
                .query(&[("api-version", self.config.api_version.as_str())])
                .header("api-key", &self.config.api_key),
            ApiType::OpenAi => {
                body["model"] = serde_json::json!(request.deployment);
                self.client
                    .post(url)
                    .bearer_auth(&self.config.api_key)
            }
        };

        debug!(
            "Completion on {} ({}), prompt {} chars",
            request.deployment,
            self.config.api_type,
            request.prompt.len()
        );

        let response = builder.json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&error_text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(error_text);

            warn!("Completion on {} failed with {}: {}", request.deployment, status_code, message);
            return Err(DocChatError::CompletionError {
                status: status_code,
                message,
            });
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| DocChatError::invalid_response(e.to_string()))?;

        match &completion.usage {
            Some(usage) => info!(
                "Completion on {} used {} tokens",
                request.deployment, usage.total_tokens
            ),
            None => warn!("Completion on {} reported no usage", request.deployment),
        }

        Ok(completion)
    }
}
