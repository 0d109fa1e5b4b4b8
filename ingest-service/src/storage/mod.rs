//! Idempotent persistence of normalized reviews.

pub mod memory;
pub mod postgres;

use crate::config::StorageConfig;
use appstore::Review;
use async_trait::async_trait;
use std::sync::Arc;

pub use memory::MemoryReviewRepository;
pub use postgres::PgReviewRepository;

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("rating {0} does not fit the rating column")]
    InvalidRating(u8),
}

#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Stores `review` unless a review with the same id already exists. Saving a
    /// duplicate is not an error.
    async fn save_raw_review(&self, review: &Review) -> Result<(), StorageError>;

    /// Creates the schema if it does not exist yet.
    async fn migrate(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Opens the repository described by `config`. Does not migrate.
pub async fn connect(config: &StorageConfig) -> Result<Arc<dyn ReviewRepository>, StorageError> {
    match config {
        StorageConfig::Postgres(pg) => Ok(Arc::new(PgReviewRepository::connect(pg).await?)),
        StorageConfig::Memory => Ok(Arc::new(MemoryReviewRepository::default())),
    }
}
