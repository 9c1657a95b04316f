//! Azure Translator client

use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::config::TranslatorConfig;
use crate::core::errors::{DocChatError, Result};
use crate::core::models::{TranslationRequest, TranslationResult};

/// Translator REST API version
pub const TRANSLATOR_API_VERSION: &str = "3.0";

/// One entry of the translate response, matching one input segment
#[derive(Debug, Deserialize)]
struct TranslateItem {
    #[serde(rename = "detectedLanguage")]
    detected_language: Option<DetectedLanguage>,
    #[serde(default)]
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct DetectedLanguage {
    language: String,
}

#[derive(Debug, Deserialize)]
struct Translation {
    text: String,
    to: Option<String>,
}

/// Error body returned by the service on failure
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Translates English text into one target language per call
#[derive(Debug, Clone)]
pub struct Translator {
    client: reqwest::Client,
    config: TranslatorConfig,
}

impl Translator {
    /// Create a new translator
    pub fn new(config: TranslatorConfig) -> Result<Self> {
        if config.key.is_empty() {
            return Err(DocChatError::config("translator key is required"));
        }
        url::Url::parse(&config.endpoint)
            .map_err(|e| DocChatError::config(format!("invalid translator endpoint '{}': {}", config.endpoint, e)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self { client, config })
    }

    /// Translate `text` into `target_lang`
    pub async fn translate(&self, text: &str, target_lang: &str) -> Result<TranslationResult> {
        self.send_request(&TranslationRequest::new(text, target_lang)).await
    }

    /// Translate and keep only the translated string
    pub async fn translate_text(&self, text: &str, target_lang: &str) -> Result<String> {
        Ok(self.translate(text, target_lang).await?.translation)
    }

    /// Send one prepared request
    pub async fn send_request(&self, request: &TranslationRequest) -> Result<TranslationResult> {
        let url = format!("{}{}", self.config.endpoint.trim_end_matches('/'), self.config.path);
        let body = serde_json::json!([{ "text": request.text }]);

        debug!(
            "Translating {} chars {} -> {} (trace {})",
            request.text.len(),
            request.source_lang,
            request.target_lang,
            request.trace_id
        );

        let mut builder = self
            .client
            .post(&url)
            .query(&[
                ("api-version", TRANSLATOR_API_VERSION),
                ("from", request.source_lang.as_str()),
                ("to", request.target_lang.as_str()),
            ])
            .header("Ocp-Apim-Subscription-Key", &self.config.key)
            .header("X-ClientTraceId", request.trace_id.to_string())
            .json(&body);

        if !self.config.region.is_empty() {
            builder = builder.header("Ocp-Apim-Subscription-Region", &self.config.region);
        }

        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&error_text)
                .map(|b| b.error.message)
                .unwrap_or(error_text);

            warn!("Translator returned {}: {}", status_code, message);
            return Err(DocChatError::TranslationError {
                status: status_code,
                message,
            });
        }

        let items: Vec<TranslateItem> = response
            .json()
            .await
            .map_err(|e| DocChatError::invalid_response(e.to_string()))?;

        let item = items
            .into_iter()
            .next()
            .ok_or_else(|| DocChatError::invalid_response("translator returned no segments"))?;

        let detected_source_lang = item.detected_language.map(|d| d.language);
        let translation = item
            .translations
            .into_iter()
            .next()
            .ok_or_else(|| DocChatError::invalid_response("No translation in response"))?;

        Ok(TranslationResult {
            translation: translation.text,
            target_lang: translation.to.unwrap_or_else(|| request.target_lang.clone()),
            detected_source_lang,
            trace_id: request.trace_id,
        })
    }
}
