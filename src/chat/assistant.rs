//! Grounded chat: gather documents, ask the model, price and translate the reply

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::chat::prompt::{self, PromptStyle};
use crate::core::completion::{CompletionClient, CompletionRequest};
use crate::core::config::AppConfig;
use crate::core::cost::CostCalculator;
use crate::core::errors::{DocChatError, Result};
use crate::core::models::{CostBreakdown, TranslationResult, UploadFile, UsageRecord};
use crate::core::storage::BlobStorageManager;
use crate::core::translator::Translator;

/// Per-question settings
#[derive(Debug, Clone)]
pub struct AskOptions {
    pub deployment: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub style: PromptStyle,
}

impl Default for AskOptions {
    fn default() -> Self {
        Self {
            deployment: None,
            temperature: 0.7,
            max_tokens: 1000,
            style: PromptStyle::Chat,
        }
    }
}

/// Outcome of one question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub deployment: String,
    pub prompt: String,
    pub reply: String,
    pub usage: Option<UsageRecord>,
    pub cost: CostBreakdown,
    /// False when the response carried no usage and `cost` is the zero breakdown
    pub cost_estimated: bool,
    pub translation: Option<TranslationResult>,
}

/// Owns one client per service and sequences them
#[derive(Debug, Clone)]
pub struct Assistant {
    storage: BlobStorageManager,
    completion: CompletionClient,
    translator: Translator,
    pricing: CostCalculator,
}

impl Assistant {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let pricing = CostCalculator::new(config.completion.deployments.clone());
        Ok(Self {
            storage: BlobStorageManager::new(config.storage.clone())?,
            completion: CompletionClient::new(config.completion.clone())?,
            translator: Translator::new(config.translator.clone())?,
            pricing,
        })
    }

    pub fn storage(&self) -> &BlobStorageManager {
        &self.storage
    }

    pub fn pricing(&self) -> &CostCalculator {
        &self.pricing
    }

    pub fn completion(&self) -> &CompletionClient {
        &self.completion
    }

    pub async fn upload(&self, file: UploadFile) -> Result<String> {
        self.storage.upload(file).await
    }

    pub async fn list_documents(&self) -> Result<Vec<String>> {
        self.storage.list().await
    }

    pub async fn read_document(&self, name: &str) -> Result<String> {
        self.storage.read(name).await
    }

    /// Every non-empty document in the container, joined by newlines.
    ///
    /// Documents that are not UTF-8 are skipped; any other failure aborts.
    pub async fn gather_context(&self) -> Result<String> {
        let names = self.storage.list().await?;
        let mut documents = Vec::with_capacity(names.len());

        for name in &names {
            match self.storage.read(name).await {
                Ok(text) => documents.push(text),
                Err(DocChatError::DecodeError { name, message }) => {
                    warn!("Skipping {}: {}", name, message);
                }
                Err(e) => return Err(e),
            }
        }

        let context = prompt::join_documents(&documents);
        info!("Gathered {} of {} documents ({} chars)", documents.len(), names.len(), context.len());
        Ok(context)
    }

    /// Ask a question grounded in the uploaded documents
    pub async fn ask(&self, input: &str, options: &AskOptions) -> Result<ChatTurn> {
        let prompt = match &options.style {
            PromptStyle::Chat => prompt::chat_prompt(&self.gather_context().await?, input),
            PromptStyle::Instructed(Some(preamble)) => prompt::instructed_prompt(preamble, input),
            PromptStyle::Instructed(None) => {
                let preamble = prompt::instructed_preamble(&self.gather_context().await?);
                prompt::instructed_prompt(&preamble, input)
            }
        };

        let deployment = options
            .deployment
            .clone()
            .unwrap_or_else(|| self.completion.default_deployment().to_string());

        let request = CompletionRequest::new(deployment.clone(), prompt.clone())
            .with_temperature(options.temperature)
            .with_max_tokens(options.max_tokens);
        let response = self.completion.complete(&request).await?;
        let reply = response.reply_text()?;

        let (cost, cost_estimated) = match self.pricing.compute(&deployment, response.usage.as_ref()) {
            Ok(cost) => (cost, true),
            Err(DocChatError::CostDataMissing) => {
                warn!("No usage reported by {}; cost shown as zero", deployment);
                (CostBreakdown::default(), false)
            }
            Err(e) => return Err(e),
        };

        Ok(ChatTurn {
            deployment,
            prompt,
            reply,
            usage: response.usage,
            cost,
            cost_estimated,
            translation: None,
        })
    }

    /// Ask, then translate the reply into `target_lang`
    pub async fn ask_and_translate(
        &self,
        input: &str,
        options: &AskOptions,
        target_lang: &str,
    ) -> Result<ChatTurn> {
        let mut turn = self.ask(input, options).await?;
        turn.translation = Some(self.translate_reply(&turn.reply, target_lang).await?);
        Ok(turn)
    }

    pub async fn translate_reply(&self, reply: &str, target_lang: &str) -> Result<TranslationResult> {
        self.translator.translate(reply, target_lang).await
    }
}
