//! Error type for the backup pipeline.

use fitbit_client::FitbitError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("API error: {0}")]
    Api(#[from] FitbitError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed payload: {0}")]
    Payload(String),

    #[error("Baseline error: {0}")]
    Baseline(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BackupError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, BackupError::Api(e) if e.is_rate_limited())
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, BackupError::Api(e) if e.is_auth())
    }

    /// Seconds the API asked us to wait, when rate limited.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            BackupError::Api(FitbitError::RateLimitExceeded { retry_after }) => *retry_after,
            _ => None,
        }
    }
}

/// Result type alias for backup operations.
pub type BackupResult<T> = Result<T, BackupError>;
