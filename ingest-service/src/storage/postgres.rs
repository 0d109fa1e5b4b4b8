use super::{ReviewRepository, StorageError};
use crate::config::PostgresConfig;
use appstore::Review;
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS raw_reviews (
    id TEXT PRIMARY KEY,
    app_id TEXT NOT NULL,
    country VARCHAR(2) NOT NULL,
    rating SMALLINT NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    reviewed_at TIMESTAMPTZ NOT NULL,
    response_date TIMESTAMPTZ,
    response_content TEXT
)"#;

const INSERT_REVIEW: &str = r#"
INSERT INTO raw_reviews (
    id, app_id, country, rating, title, content, reviewed_at, response_date, response_content
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
ON CONFLICT (id) DO NOTHING"#;

pub struct PgReviewRepository {
    pool: PgPool,
}

impl PgReviewRepository {
    /// Opens a pool and checks that the database answers.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.dsn)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;
        tracing::info!(max_connections = config.max_connections, "database connected");

        Ok(PgReviewRepository { pool })
    }
}

#[async_trait]
impl ReviewRepository for PgReviewRepository {
    async fn save_raw_review(&self, review: &Review) -> Result<(), StorageError> {
        let rating = i16::from(review.rating);
        if !(1..=5).contains(&rating) {
            return Err(StorageError::InvalidRating(review.rating));
        }

        let response = review.developer_response.as_ref();
        sqlx::query(INSERT_REVIEW)
            .bind(&review.id)
            .bind(&review.app_id)
            .bind(&review.country)
            .bind(rating)
            .bind(&review.title)
            .bind(&review.content)
            .bind(review.reviewed_at)
            .bind(response.and_then(|r| r.responded_at))
            .bind(response.map(|r| r.content.as_str()))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        tracing::info!("raw_reviews schema applied");
        Ok(())
    }
}
