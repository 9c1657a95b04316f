//! docchat - chat with documents kept in Azure Blob Storage
//!
//! This library uploads text documents to a blob container, feeds them to a
//! completions endpoint as grounding context, prices each call from its token
//! usage and translates replies with Azure Translator.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod chat;
pub mod cli;
pub mod core;
pub mod server;

// Re-export key types for convenience
pub use chat::{AskOptions, Assistant, ChatTurn, PromptStyle};
pub use core::{
    completion::{CompletionClient, CompletionRequest, CompletionResponse},
    config::{AppConfig, CompletionConfig, StorageConfig, TranslatorConfig},
    cost::{compute_cost, CostCalculator, DEFAULT_COST_PER_TOKEN},
    errors::{DocChatError, Result},
    models::{CostBreakdown, TranslationRequest, TranslationResult, UploadFile, UsageRecord},
    storage::BlobStorageManager,
    translator::Translator,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
