use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use super::{MAX_RATING, MIN_RATING, RatingStats, Review};

/// Persistence failure. The detail is for logs only.
#[derive(Debug, Error)]
#[error("review storage failed: {0:#}")]
pub struct StorageError(#[from] anyhow::Error);

/// Append-only review persistence.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Stores a review and returns it with its assigned id and timestamp.
    async fn insert(
        &self,
        rating: i32,
        review_text: &str,
        user_response: &str,
        admin_summary: &str,
        recommended_action: &str,
    ) -> Result<Review, StorageError>;

    /// Newest first. A filter outside 1..=5 is treated as no filter.
    async fn list(&self, rating_filter: Option<i32>) -> Result<Vec<Review>, StorageError>;

    async fn stats_by_rating(&self) -> Result<RatingStats, StorageError>;

    async fn ping(&self) -> Result<(), StorageError>;
}

/// Normalizes a list filter: only ratings in 1..=5 restrict the listing.
pub fn effective_filter(rating_filter: Option<i32>) -> Option<i32> {
    rating_filter.filter(|rating| (MIN_RATING..=MAX_RATING).contains(rating))
}

#[derive(Clone)]
pub struct PgReviewStore {
    pool: PgPool,
}

impl PgReviewStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReviewStore for PgReviewStore {
    async fn insert(
        &self,
        rating: i32,
        review_text: &str,
        user_response: &str,
        admin_summary: &str,
        recommended_action: &str,
    ) -> Result<Review, StorageError> {
        let review = sqlx::query_as::<_, Review>(
            "INSERT INTO reviews (rating, review_text, user_response, admin_summary, recommended_action)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, rating, review_text, user_response, admin_summary, recommended_action, created_at",
        )
        .bind(rating)
        .bind(review_text)
        .bind(user_response)
        .bind(admin_summary)
        .bind(recommended_action)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert review")?;

        Ok(review)
    }

    async fn list(&self, rating_filter: Option<i32>) -> Result<Vec<Review>, StorageError> {
        let reviews = if let Some(rating) = effective_filter(rating_filter) {
            sqlx::query_as::<_, Review>(
                "SELECT id, rating, review_text, user_response, admin_summary, recommended_action, created_at
                 FROM reviews
                 WHERE rating = $1
                 ORDER BY created_at DESC, id DESC",
            )
            .bind(rating)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("failed to load reviews with rating {rating}"))?
        } else {
            sqlx::query_as::<_, Review>(
                "SELECT id, rating, review_text, user_response, admin_summary, recommended_action, created_at
                 FROM reviews
                 ORDER BY created_at DESC, id DESC",
            )
            .fetch_all(&self.pool)
            .await
            .context("failed to load reviews")?
        };

        Ok(reviews)
    }

    async fn stats_by_rating(&self) -> Result<RatingStats, StorageError> {
        let rows = sqlx::query_as::<_, (i32, i64)>(
            "SELECT rating, COUNT(*) AS count FROM reviews GROUP BY rating",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to count reviews by rating")?;

        Ok(RatingStats::from_counts(rows))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("database ping failed")?;
        Ok(())
    }
}
