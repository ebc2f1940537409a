//! In-memory stand-ins for the completion service and review store.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use super::{
    RatingStats, ResponseGenerator, Review, ReviewStore, StorageError, SubmissionPipeline,
    store::effective_filter,
};
use crate::{config::GenerationSettings, llm::CompletionService};

pub struct CountingCompletions {
    pub calls: AtomicUsize,
    fail: bool,
}

impl CountingCompletions {
    pub fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail,
        })
    }
}

#[async_trait]
impl CompletionService for CountingCompletions {
    async fn complete(&self, prompt: &str, _temperature: f32, _max_tokens: u32) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            bail!("provider unavailable");
        }
        if prompt.contains("ACTION: [your recommendation]") {
            Ok("SUMMARY: Generated summary\nACTION: Generated action".to_string())
        } else {
            Ok("Generated reply".to_string())
        }
    }
}

/// In-memory store with a fixed clock step so ordering is deterministic.
/// With `frozen_clock` set every row gets the same `created_at`.
#[derive(Default)]
pub struct MemoryStore {
    pub rows: Mutex<Vec<Review>>,
    pub fail_writes: AtomicBool,
    pub frozen_clock: AtomicBool,
    pub inserts: AtomicUsize,
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn insert(
        &self,
        rating: i32,
        review_text: &str,
        user_response: &str,
        admin_summary: &str,
        recommended_action: &str,
    ) -> Result<Review, StorageError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("connection reset").into());
        }

        let mut rows = self.rows.lock().await;
        let id = rows.len() as i64 + 1;
        let base = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let step = if self.frozen_clock.load(Ordering::SeqCst) {
            0
        } else {
            id
        };
        let review = Review {
            id,
            rating,
            review_text: review_text.to_string(),
            user_response: user_response.to_string(),
            admin_summary: admin_summary.to_string(),
            recommended_action: recommended_action.to_string(),
            created_at: base + Duration::seconds(step),
        };
        rows.push(review.clone());
        Ok(review)
    }

    async fn list(&self, rating_filter: Option<i32>) -> Result<Vec<Review>, StorageError> {
        let filter = effective_filter(rating_filter);
        let mut reviews: Vec<Review> = self
            .rows
            .lock()
            .await
            .iter()
            .filter(|review| filter.is_none_or(|rating| review.rating == rating))
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(reviews)
    }

    async fn stats_by_rating(&self) -> Result<RatingStats, StorageError> {
        let rows = self.rows.lock().await;
        Ok(RatingStats::from_counts(
            rows.iter().map(|review| (review.rating, 1)),
        ))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

pub fn pipeline(completions: Arc<CountingCompletions>, store: Arc<MemoryStore>) -> SubmissionPipeline {
    let generator = ResponseGenerator::new(completions, GenerationSettings::default());
    SubmissionPipeline::new(generator, store)
}
