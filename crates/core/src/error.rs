use thiserror::Error;

use crate::types::{ItemId, UserId};

pub type ScoringResult<T> = Result<T, ScoringError>;

#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("Insufficient data to train {component}: need at least {required}, found {found}")]
    InsufficientData {
        component: &'static str,
        required: usize,
        found: usize,
    },

    #[error("Catalog is empty, nothing to train on")]
    NoItems,

    #[error("{0} is not trained yet, trigger a retrain first")]
    NotTrained(&'static str),

    #[error("Item {0} not found")]
    ItemNotFound(ItemId),

    #[error("User {0} not found")]
    UserNotFound(UserId),

    #[error("Category '{0}' was not seen at training time")]
    UnknownCategory(String),

    #[error("Training pass timed out after {0} ms")]
    TrainingTimedOut(u64),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Repository error: {0}")]
    Repository(#[source] anyhow::Error),

    #[error("Snapshot persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScoringError {
    /// Conditions the caller can resolve by retrying later, typically after
    /// more data arrives or an operator triggers a retrain.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScoringError::InsufficientData { .. }
                | ScoringError::NoItems
                | ScoringError::NotTrained(_)
                | ScoringError::TrainingTimedOut(_)
        )
    }

    /// True for the "not enough data" family, which a training pass reports
    /// per model instead of aborting.
    pub fn is_insufficient_data(&self) -> bool {
        matches!(
            self,
            ScoringError::InsufficientData { .. } | ScoringError::NoItems
        )
    }
}
