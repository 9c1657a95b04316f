//! Custom error types for storage, translation and completion operations

use thiserror::Error;

/// Errors raised by the docchat clients
#[derive(Error, Debug)]
pub enum DocChatError {
    /// Client could not be set up from its configuration
    #[error("Configuration error: {message}")]
    ConfigError {
        message: String,
    },

    /// Caller supplied an argument the operation rejects
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
    },

    /// Blob service answered with a failure status
    #[error("Storage error: {status:?} {code:?} - {message}")]
    StorageError {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },

    /// Requested blob does not exist
    #[error("Blob not found: {name}")]
    NotFound {
        name: String,
    },

    /// Blob content is not valid UTF-8
    #[error("Blob '{name}' is not valid UTF-8: {message}")]
    DecodeError {
        name: String,
        message: String,
    },

    /// Translator answered with a failure status
    #[error("Translation error: {status} - {message}")]
    TranslationError {
        status: u16,
        message: String,
    },

    /// Completion API answered with a failure status
    #[error("Completion error: {status} - {message}")]
    CompletionError {
        status: u16,
        message: String,
    },

    /// Response body did not have the expected shape
    #[error("Invalid response: {message}")]
    InvalidResponseError {
        message: String,
    },

    /// Completion response carried no usage counters
    #[error("Completion response has no token usage")]
    CostDataMissing,

    /// Wrapper for anyhow errors
    #[error("Internal error: {0}")]
    InternalError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Reqwest error
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// XML error
    #[error("XML error: {0}")]
    XmlError(#[from] quick_xml::DeError),
}

impl DocChatError {
    pub fn config(message: impl Into<String>) -> Self {
        DocChatError::ConfigError {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        DocChatError::InvalidInput {
            message: message.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        DocChatError::InvalidResponseError {
            message: message.into(),
        }
    }

    /// True when the failure came from a remote service or the network
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            DocChatError::StorageError { .. }
                | DocChatError::TranslationError { .. }
                | DocChatError::CompletionError { .. }
                | DocChatError::InvalidResponseError { .. }
                | DocChatError::HttpError(_)
                | DocChatError::XmlError(_)
        )
    }
}

impl From<anyhow::Error> for DocChatError {
    fn from(err: anyhow::Error) -> Self {
        DocChatError::InternalError(err.to_string())
    }
}

/// Result type for docchat operations
pub type Result<T> = std::result::Result<T, DocChatError>;
