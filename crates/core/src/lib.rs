pub mod config;
pub mod error;
pub mod repository;
pub mod types;

pub use config::{AppConfig, ScoringConfig};
pub use error::{ScoringError, ScoringResult};
pub use repository::{InMemoryRepository, TransactionRepository};
