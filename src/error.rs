//! SOS Alert Error Types
//!
//! Centralized error handling. Channel-level failures use [`ProviderError`]
//! so a report can carry one per channel without aborting the other.

use thiserror::Error;

/// Central error type for SOS Alert
#[derive(Error, Debug)]
pub enum SosError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Geocoding error: {0}")]
    Geocode(String),

    #[error("Lock poisoned: {0}")]
    Lock(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for SOS Alert operations
pub type SosResult<T> = Result<T, SosError>;

/// Helper to convert Mutex poison errors
impl<T> From<std::sync::PoisonError<T>> for SosError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        SosError::Lock(err.to_string())
    }
}

/// Failure of a single communications channel (call or SMS)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Provider credentials are missing. Please configure them in settings.")]
    MissingCredentials,

    #[error("Emergency contact number is not configured")]
    MissingContact,

    #[error("Provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Network(err.to_string())
    }
}
