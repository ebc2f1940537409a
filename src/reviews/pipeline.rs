use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

use super::{
    RatingStats, Review, ResponseGenerator, ReviewStore, StorageError, ValidationErrors, validate,
};

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Public view of a stored submission. Admin-only fields are withheld.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub id: i64,
    pub rating: i32,
    pub user_response: String,
    pub created_at: DateTime<Utc>,
}

impl From<Review> for SubmissionReceipt {
    fn from(review: Review) -> Self {
        Self {
            id: review.id,
            rating: review.rating,
            user_response: review.user_response,
            created_at: review.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewListing {
    pub reviews: Vec<Review>,
    pub stats: RatingStats,
    pub total: usize,
}

/// Validate, generate, persist. AI failures never surface here; only
/// validation and storage errors do.
#[derive(Clone)]
pub struct SubmissionPipeline {
    generator: ResponseGenerator,
    store: Arc<dyn ReviewStore>,
}

impl SubmissionPipeline {
    pub fn new(generator: ResponseGenerator, store: Arc<dyn ReviewStore>) -> Self {
        Self { generator, store }
    }

    pub async fn submit(
        &self,
        raw_rating: &Value,
        raw_text: &Value,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let submission = validate(raw_rating, raw_text)?;
        info!(rating = submission.rating, "generating responses for review");

        let generated = self
            .generator
            .generate(submission.rating, &submission.text)
            .await;

        let review = self
            .store
            .insert(
                submission.rating,
                &submission.text,
                &generated.user_response,
                &generated.admin_summary,
                &generated.recommended_action,
            )
            .await
            .inspect_err(|err| error!(?err, "failed to persist review"))?;

        info!(review_id = review.id, rating = review.rating, "review saved");
        Ok(review.into())
    }

    pub async fn query(&self, rating_filter: Option<i32>) -> Result<ReviewListing, StorageError> {
        let (reviews, stats) =
            tokio::try_join!(self.store.list(rating_filter), self.store.stats_by_rating())?;

        Ok(ReviewListing {
            total: reviews.len(),
            reviews,
            stats,
        })
    }

    pub async fn stats(&self) -> Result<RatingStats, StorageError> {
        self.store.stats_by_rating().await
    }

    pub async fn health_check(&self) -> Result<(), StorageError> {
        self.store.ping().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use serde_json::json;

    use super::*;
    use crate::reviews::{
        ValidationError,
        generator::{fallback_admin_summary, fallback_recommended_action, fallback_user_response},
        test_support::{CountingCompletions, MemoryStore, pipeline},
    };

    #[tokio::test]
    async fn every_rating_is_stored_with_a_reply_whether_or_not_ai_works() {
        for fail in [false, true] {
            let store = Arc::new(MemoryStore::default());
            let pipeline = pipeline(CountingCompletions::new(fail), store.clone());

            for rating in 1..=5 {
                let receipt = pipeline
                    .submit(&json!(rating), &json!("  The visit was memorable.  "))
                    .await
                    .unwrap();
                assert_eq!(receipt.rating, rating);
                assert!(!receipt.user_response.is_empty());
            }

            let stored = store.rows.lock().await;
            assert_eq!(stored.len(), 5);
            for review in stored.iter() {
                assert_eq!(review.review_text, "The visit was memorable.");
                assert!(!review.admin_summary.is_empty());
                assert!(!review.recommended_action.is_empty());
            }
        }
    }

    #[tokio::test]
    async fn ai_outage_stores_fallback_content() {
        let store = Arc::new(MemoryStore::default());
        let completions = CountingCompletions::new(true);
        let pipeline = pipeline(completions.clone(), store.clone());

        let receipt = pipeline.submit(&json!(1), &json!("Cold food")).await.unwrap();
        assert_eq!(receipt.user_response, fallback_user_response(1));
        assert_eq!(completions.calls.load(Ordering::SeqCst), 2);

        let stored = store.rows.lock().await;
        assert_eq!(stored[0].admin_summary, fallback_admin_summary(1, "Cold food"));
        assert_eq!(stored[0].recommended_action, fallback_recommended_action(1));
    }

    #[tokio::test]
    async fn receipt_withholds_admin_fields() {
        let store = Arc::new(MemoryStore::default());
        let pipeline = pipeline(CountingCompletions::new(false), store);

        let receipt = pipeline.submit(&json!(4), &json!("Nice")).await.unwrap();
        let body = serde_json::to_value(&receipt).unwrap();
        let keys: Vec<&str> = body.as_object().unwrap().keys().map(String::as_str).collect();

        assert_eq!(keys.len(), 4);
        for key in ["id", "rating", "userResponse", "createdAt"] {
            assert!(keys.contains(&key), "missing {key}");
        }
        assert_eq!(body["userResponse"], "Generated reply");
    }

    #[tokio::test]
    async fn validation_failure_skips_ai_and_storage() {
        let store = Arc::new(MemoryStore::default());
        let completions = CountingCompletions::new(false);
        let pipeline = pipeline(completions.clone(), store.clone());

        let cases = [
            (json!(5), json!("   "), vec![ValidationError::EmptyReview]),
            (json!(9), json!("fine"), vec![ValidationError::InvalidRating]),
            (
                json!(3),
                json!("a".repeat(5001)),
                vec![ValidationError::ReviewTooLong { length: 5001 }],
            ),
            (
                json!(0),
                json!(""),
                vec![ValidationError::InvalidRating, ValidationError::EmptyReview],
            ),
        ];

        for (rating, text, expected) in cases {
            match pipeline.submit(&rating, &text).await {
                Err(SubmissionError::Validation(errors)) => assert_eq!(errors.errors(), expected),
                other => panic!("expected validation failure, got {other:?}"),
            }
        }

        assert_eq!(completions.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.inserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn storage_failure_is_reported_once_without_retry() {
        let store = Arc::new(MemoryStore::default());
        store.fail_writes.store(true, Ordering::SeqCst);
        let pipeline = pipeline(CountingCompletions::new(false), store.clone());

        let err = pipeline.submit(&json!(2), &json!("Late")).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Storage(_)));
        assert_eq!(store.inserts.load(Ordering::SeqCst), 1);
        assert!(store.rows.lock().await.is_empty());
    }

    #[tokio::test]
    async fn query_filters_newest_first_and_counts_by_rating() {
        let store = Arc::new(MemoryStore::default());
        let pipeline = pipeline(CountingCompletions::new(false), store);

        let empty = pipeline.query(None).await.unwrap();
        assert_eq!(empty.total, 0);
        assert_eq!(empty.stats, RatingStats::empty());

        let first = pipeline.submit(&json!(5), &json!("First")).await.unwrap();
        pipeline.submit(&json!(5), &json!("Second")).await.unwrap();
        pipeline.submit(&json!(1), &json!("Third")).await.unwrap();

        let stats = pipeline.stats().await.unwrap();
        assert_eq!(
            serde_json::to_value(&stats).unwrap(),
            json!({ "1": 1, "2": 0, "3": 0, "4": 0, "5": 2 })
        );

        let fives = pipeline.query(Some(5)).await.unwrap();
        assert_eq!(fives.total, 2);
        assert_eq!(fives.reviews[0].review_text, "Second");
        assert_eq!(fives.reviews[1].id, first.id);
        assert_eq!(fives.stats, stats);

        let everything = pipeline.query(Some(7)).await.unwrap();
        assert_eq!(everything.total, 3);
        assert_eq!(everything.reviews[0].review_text, "Third");
    }

    #[tokio::test]
    async fn equal_timestamps_list_higher_id_first() {
        let store = Arc::new(MemoryStore::default());
        store.frozen_clock.store(true, Ordering::SeqCst);
        let pipeline = pipeline(CountingCompletions::new(false), store);

        let older = pipeline.submit(&json!(5), &json!("Earlier")).await.unwrap();
        pipeline.submit(&json!(1), &json!("Unrelated")).await.unwrap();
        let newer = pipeline.submit(&json!(5), &json!("Later")).await.unwrap();
        assert_eq!(older.created_at, newer.created_at);

        let fives = pipeline.query(Some(5)).await.unwrap();
        let ids: Vec<i64> = fives.reviews.iter().map(|review| review.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn repeated_queries_are_identical() {
        let store = Arc::new(MemoryStore::default());
        let pipeline = pipeline(CountingCompletions::new(false), store);
        pipeline.submit(&json!(3), &json!("Okay")).await.unwrap();
        pipeline.submit(&json!(4), &json!("Good")).await.unwrap();

        let first = pipeline.query(None).await.unwrap();
        let second = pipeline.query(None).await.unwrap();
        assert_eq!(first, second);
    }
}
