pub mod generator;
pub mod pipeline;
pub mod store;
pub mod validation;

#[cfg(test)]
pub mod test_support;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

pub use generator::ResponseGenerator;
pub use pipeline::{ReviewListing, SubmissionError, SubmissionPipeline, SubmissionReceipt};
pub use store::{PgReviewStore, ReviewStore, StorageError};
pub use validation::{ValidationError, ValidationErrors, validate};

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;
pub const MAX_REVIEW_CHARS: usize = 5000;

/// A rating and review text that passed validation. Never stored directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewSubmission {
    pub rating: i32,
    pub text: String,
}

/// AI (or fallback) content produced for a submission. All fields are non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedResponse {
    pub user_response: String,
    pub admin_summary: String,
    pub recommended_action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: i64,
    pub rating: i32,
    pub review_text: String,
    pub user_response: String,
    pub admin_summary: String,
    pub recommended_action: String,
    pub created_at: DateTime<Utc>,
}

/// Rating bands that select prompt tone and fallback templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingTier {
    Negative,
    Neutral,
    Positive,
}

impl RatingTier {
    pub fn from_rating(rating: i32) -> Self {
        match rating {
            r if r <= 2 => RatingTier::Negative,
            3 => RatingTier::Neutral,
            _ => RatingTier::Positive,
        }
    }
}

/// Review counts keyed by rating. Always holds an entry for every rating 1..=5.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RatingStats(BTreeMap<i32, i64>);

impl RatingStats {
    pub fn empty() -> Self {
        Self((MIN_RATING..=MAX_RATING).map(|rating| (rating, 0)).collect())
    }

    /// Builds stats from grouped `(rating, count)` rows, ignoring ratings outside 1..=5.
    pub fn from_counts(rows: impl IntoIterator<Item = (i32, i64)>) -> Self {
        let mut stats = Self::empty();
        for (rating, count) in rows {
            if let Some(slot) = stats.0.get_mut(&rating) {
                *slot += count;
            }
        }
        stats
    }

    pub fn total(&self) -> i64 {
        self.0.values().sum()
    }
}

impl Default for RatingStats {
    fn default() -> Self {
        Self::empty()
    }
}
