use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("LLM parsing error: {0}")]
    LLMParsing(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Processing error: {0}")]
    Processing(String),
    #[error("Provider error: {0}")]
    Provider(String),
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("Cache error: {0}")]
    Cache(String),
    #[error("Insufficient credits: required {required}, available {available}")]
    InsufficientCredits { required: i64, available: i64 },
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Whether retrying the failed call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::OpenAI(err) => {
                matches!(err, OpenAIError::Reqwest(_) | OpenAIError::ApiError(_))
            }
            AppError::Provider(_) | AppError::Timeout(_) | AppError::Io(_) => true,
            _ => false,
        }
    }

    pub fn is_payment_required(&self) -> bool {
        matches!(self, AppError::InsufficientCredits { .. })
    }
}
