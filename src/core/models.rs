//! Core data models shared by the clients

use bytes::Bytes;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

use crate::core::errors::{DocChatError, Result};

/// Source language of every translation request
pub const SOURCE_LANGUAGE: &str = "en";

/// Target languages offered to users, as (code, display name)
pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("fr", "French"),
    ("hi", "Hindi"),
    ("es", "Spanish"),
    ("de", "German"),
];

/// Display name for a language code, if it is one we offer
pub fn language_name(code: &str) -> Option<&'static str> {
    SUPPORTED_LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// A named document ready to be written to the container
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Read a local file; the blob is named after the file name
    pub async fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| DocChatError::invalid_input(format!("{} has no file name", path.display())))?;
        let content = tokio::fs::read(path).await?;
        Ok(Self::new(name, content))
    }
}

/// One translation call: fixed source language and a fresh trace id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
    pub trace_id: Uuid,
}

impl TranslationRequest {
    pub fn new(text: impl Into<String>, target_lang: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_lang: SOURCE_LANGUAGE.to_string(),
            target_lang: target_lang.into(),
            trace_id: Uuid::new_v4(),
        }
    }
}

/// Translation result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationResult {
    pub translation: String,
    pub target_lang: String,
    pub detected_source_lang: Option<String>,
    pub trace_id: Uuid,
}

/// Token counters reported by the completion API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl UsageRecord {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Cost estimate derived from one usage record.
///
/// `Default` is the all-zero breakdown shown when a response carried no usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub total_cost: Decimal,
    pub total_tokens: u64,
    pub input_cost: Decimal,
    pub prompt_tokens: u64,
    pub completion_cost: Decimal,
    pub completion_tokens: u64,
}

impl CostBreakdown {
    /// Labelled rows for tabular display, costs in USD to six places
    pub fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Estimated cost", format!("{:.6}", self.total_cost)),
            ("Total Tokens", self.total_tokens.to_string()),
            ("Input Prompt Cost", format!("{:.6}", self.input_cost)),
            ("Prompt Tokens", self.prompt_tokens.to_string()),
            ("Completion Cost", format!("{:.6}", self.completion_cost)),
            ("Completion Tokens", self.completion_tokens.to_string()),
        ]
    }
}

/// Flavour of completions API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiType {
    /// Azure OpenAI: deployment in the path, `api-key` header
    Azure,
    /// OpenAI: model in the body, bearer token
    OpenAi,
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiType::Azure => write!(f, "azure"),
            ApiType::OpenAi => write!(f, "open_ai"),
        }
    }
}

impl std::str::FromStr for ApiType {
    type Err = DocChatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "azure" | "azure_ad" => Ok(ApiType::Azure),
            "open_ai" | "openai" => Ok(ApiType::OpenAi),
            other => Err(DocChatError::config(format!("unknown api type: {other}"))),
        }
    }
}

/// A completion deployment and its price
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub name: String,
    pub model: String,
    pub cost_per_token: Decimal,
}
