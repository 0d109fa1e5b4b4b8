use crate::bus::PublishError;
use appstore::{FetchError, TokenError};
use thiserror::Error;

/// Rejections of an incoming request. Never retried.
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("saga_id is required")]
    MissingSagaId,

    #[error("app_id is required")]
    MissingAppId,

    #[error("at least one country is required")]
    NoCountries,

    #[error("invalid country code: {0:?}")]
    InvalidCountry(String),

    #[error("limit must be greater than 0")]
    InvalidLimit,
}

/// Reasons a saga ended without publishing its completion event.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("failed to extract token for country {country}: {source}")]
    Token { country: String, source: TokenError },

    /// `saved` counts the reviews collected before the failure that were still persisted.
    #[error("failed to fetch reviews for country {country}: {source}")]
    Fetch {
        country: String,
        saved: usize,
        source: FetchError,
    },

    #[error("failed to publish completion event: {0}")]
    Publish(#[from] PublishError),

    #[error("saga cancelled")]
    Cancelled,
}

impl IngestError {
    /// Short label used as a metric tag.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Validation(_) => "validation",
            IngestError::Token { .. } => "token",
            IngestError::Fetch {
                source: FetchError::Cancelled,
                ..
            }
            | IngestError::Cancelled => "cancelled",
            IngestError::Fetch { .. } => "fetch",
            IngestError::Publish(_) => "publish",
        }
    }
}
