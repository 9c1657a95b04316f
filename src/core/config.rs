//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::core::cost::{known_model_rate, DEFAULT_COST_PER_TOKEN};
use crate::core::models::{ApiType, Deployment};

const DEFAULT_TRANSLATOR_ENDPOINT: &str = "https://api.cognitive.microsofttranslator.com";
const DEFAULT_TRANSLATOR_PATH: &str = "/translate";
const DEFAULT_API_VERSION: &str = "2022-12-01";
const DEFAULT_DEPLOYMENT: &str = "text-davinci-003";
const DEFAULT_TIMEOUT_MS: u64 = 30000;

/// Blob storage account and container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub account_url: String,
    pub credential: String,
    pub container: String,
    #[serde(default)]
    pub account_name: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Azure Translator resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorConfig {
    pub key: String,
    pub endpoint: String,
    #[serde(default)]
    pub region: String,
    #[serde(default = "default_translator_path")]
    pub path: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Completions API and the deployments it serves
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    pub api_type: ApiType,
    pub api_base: String,
    pub api_version: String,
    pub api_key: String,
    pub default_deployment: String,
    #[serde(default)]
    pub deployments: Vec<Deployment>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Whole application configuration, built once and handed to each client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub translator: TranslatorConfig,
    pub completion: CompletionConfig,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_translator_path() -> String {
    DEFAULT_TRANSLATOR_PATH.to_string()
}

fn required(name: &str) -> anyhow::Result<String> {
    std::env::var(name).map_err(|_| anyhow::anyhow!("{} environment variable is required", name))
}

fn optional(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Parse a `name=model,name=model` deployment table
pub fn parse_deployments(table: &str) -> anyhow::Result<Vec<Deployment>> {
    table
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, model) = entry
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("deployment entry '{}' is not name=model", entry))?;
            let model = model.trim();
            Ok(Deployment {
                name: name.trim().to_string(),
                model: model.to_string(),
                cost_per_token: known_model_rate(model).unwrap_or(DEFAULT_COST_PER_TOKEN),
            })
        })
        .collect()
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let timeout_ms = optional("REQUEST_TIMEOUT_MS", "30000").parse::<u64>()?;

        let storage = StorageConfig {
            account_url: required("STORAGE_ACCOUNT_URL")?,
            credential: required("STORAGE_ACCOUNT_KEY")?,
            container: required("STORAGE_CONTAINER")?,
            account_name: std::env::var("STORAGE_ACCOUNT_NAME").ok(),
            timeout_ms,
        };

        let translator = TranslatorConfig {
            key: required("TRANSLATOR_KEY")?,
            endpoint: optional("TRANSLATOR_ENDPOINT", DEFAULT_TRANSLATOR_ENDPOINT),
            region: optional("TRANSLATOR_REGION", ""),
            path: DEFAULT_TRANSLATOR_PATH.to_string(),
            timeout_ms,
        };

        let deployments = match std::env::var("OPENAI_DEPLOYMENTS") {
            Ok(table) => parse_deployments(&table)?,
            Err(_) => vec![],
        };

        let completion = CompletionConfig {
            api_type: optional("OPENAI_API_TYPE", "azure").parse()?,
            api_base: required("OPENAI_API_BASE")?,
            api_version: optional("OPENAI_API_VERSION", DEFAULT_API_VERSION),
            api_key: required("OPENAI_API_KEY")?,
            default_deployment: optional("OPENAI_DEPLOYMENT", DEFAULT_DEPLOYMENT),
            deployments,
            timeout_ms,
        };

        Ok(Self {
            storage,
            translator,
            completion,
        })
    }

    /// Load from the environment and fill in the default deployment
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::from_env()?;
        config.ensure_default_deployment();
        config.validate()?;
        Ok(config)
    }

    /// Make sure the default deployment is priced like the others
    pub fn ensure_default_deployment(&mut self) {
        let completion = &mut self.completion;
        if completion.find_deployment(&completion.default_deployment).is_none() {
            let name = completion.default_deployment.clone();
            let cost_per_token = known_model_rate(&name).unwrap_or(DEFAULT_COST_PER_TOKEN);
            completion.deployments.insert(
                0,
                Deployment {
                    model: name.clone(),
                    name,
                    cost_per_token,
                },
            );
            info!("Registered default deployment {}", completion.default_deployment);
        }
    }

    /// Load from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&content)?;
        config.ensure_default_deployment();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage.account_url.is_empty() {
            return Err(anyhow::anyhow!("Storage account URL is required"));
        }

        if self.storage.credential.is_empty() {
            return Err(anyhow::anyhow!("Storage credential is required"));
        }

        if self.storage.container.is_empty() {
            return Err(anyhow::anyhow!("Storage container is required"));
        }

        if self.translator.key.is_empty() || self.translator.endpoint.is_empty() {
            return Err(anyhow::anyhow!("Translator key and endpoint are required"));
        }

        if self.translator.region.is_empty() {
            warn!("No translator region configured");
        }

        if self.completion.api_base.is_empty() || self.completion.api_key.is_empty() {
            return Err(anyhow::anyhow!("Completion API base and key are required"));
        }

        if self.completion.default_deployment.is_empty() {
            return Err(anyhow::anyhow!("A default deployment is required"));
        }

        Ok(())
    }
}

impl CompletionConfig {
    /// Find deployment by name
    pub fn find_deployment(&self, name: &str) -> Option<&Deployment> {
        self.deployments.iter().find(|d| d.name == name)
    }

    /// Get all deployment names
    pub fn deployment_names(&self) -> Vec<String> {
        self.deployments.iter().map(|d| d.name.clone()).collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal::Decimal;

    /// Config pointing every client at `base`, for tests that never hit the network
    /// or that serve all three APIs from one mock server.
    pub(crate) fn test_config(base: &str) -> AppConfig {
        AppConfig {
            storage: StorageConfig {
                account_url: format!("{}/devstoreaccount1", base),
                credential: "c2VjcmV0LWtleQ==".to_string(),
                container: "docs".to_string(),
                account_name: None,
                timeout_ms: 5000,
            },
            translator: TranslatorConfig {
                key: "translator-key".to_string(),
                endpoint: base.to_string(),
                region: "westeurope".to_string(),
                path: "/translate".to_string(),
                timeout_ms: 5000,
            },
            completion: CompletionConfig {
                api_type: ApiType::Azure,
                api_base: base.to_string(),
                api_version: "2022-12-01".to_string(),
                api_key: "openai-key".to_string(),
                default_deployment: "restaurant".to_string(),
                deployments: vec![Deployment {
                    name: "restaurant".to_string(),
                    model: "text-davinci-003".to_string(),
                    cost_per_token: Decimal::new(2, 5),
                }],
                timeout_ms: 5000,
            },
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(test_config("http://localhost:1").validate().is_ok());
    }

    #[test]
    fn test_config_validation_missing_container() {
        let mut config = test_config("http://localhost:1");
        config.storage.container = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_deployments() {
        let deployments = parse_deployments("restaurant=text-davinci-003, htiOaiDEP=gpt-35-turbo").unwrap();
        assert_eq!(deployments.len(), 2);
        assert_eq!(deployments[1].name, "htiOaiDEP");
        assert_eq!(deployments[1].cost_per_token, Decimal::new(15, 6));

        assert!(parse_deployments("no-equals-sign").is_err());
        assert!(parse_deployments("").unwrap().is_empty());
    }

    #[test]
    fn test_default_deployment_registered_once() {
        let mut config = test_config("http://localhost:1");
        config.completion.default_deployment = "gpt-35-turbo".to_string();
        config.ensure_default_deployment();
        config.ensure_default_deployment();

        assert_eq!(config.completion.deployments.len(), 2);
        let added = config.completion.find_deployment("gpt-35-turbo").unwrap();
        assert_eq!(added.cost_per_token, Decimal::new(15, 6));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docchat.json");
        let config = test_config("http://localhost:1");
        config.to_file(&path).unwrap();

        let loaded = AppConfig::from_file(&path).unwrap();
        assert_eq!(loaded.storage.container, "docs");
        assert_eq!(loaded.completion.deployment_names(), vec!["restaurant".to_string()]);
    }
}
