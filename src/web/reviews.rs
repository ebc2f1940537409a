use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use super::{
    AppState,
    responses::{ApiError, ApiResult, ApiSuccess, json_error, try_again_later, validation_failed},
};
use crate::reviews::{
    MAX_RATING, MIN_RATING, RatingStats, ReviewListing, SubmissionError, SubmissionReceipt,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/reviews", get(list_reviews).post(submit_review))
        .route("/api/reviews/stats", get(review_stats))
}

/// Raw submission body. Fields stay untyped so the validator reports
/// field-level errors instead of a generic deserialization failure.
#[derive(Debug, Deserialize)]
pub struct SubmitReviewBody {
    #[serde(default)]
    rating: Value,
    #[serde(default)]
    review: Value,
}

#[derive(Debug, Deserialize)]
pub struct ReviewFilterParams {
    rating: Option<String>,
}

impl ReviewFilterParams {
    /// Reads the leading integer (`"3.5"` is 3, `"5abc"` is 5). Values with no
    /// leading integer are ignored; integers must be 1..=5.
    fn rating(&self) -> Result<Option<i32>, ApiError> {
        let Some(parsed) = self.rating.as_deref().and_then(leading_integer) else {
            return Ok(None);
        };

        match i32::try_from(parsed) {
            Ok(rating) if (MIN_RATING..=MAX_RATING).contains(&rating) => Ok(Some(rating)),
            _ => Err(ApiError::new("Invalid query parameters")
                .with_detail("rating", "Rating must be between 1 and 5")),
        }
    }
}

/// Optional sign followed by decimal digits, after leading whitespace.
/// Digit runs too large for `i64` saturate so they still read as out of range.
fn leading_integer(raw: &str) -> Option<i64> {
    let raw = raw.trim_start();
    let (negative, rest) = match raw.as_bytes().first() {
        Some(b'-') => (true, &raw[1..]),
        Some(b'+') => (false, &raw[1..]),
        _ => (false, raw),
    };
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let digits = &rest[..digits_end];
    if digits.is_empty() {
        return None;
    }

    let magnitude = digits.parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    by_rating: RatingStats,
    total: i64,
}

async fn submit_review(
    State(state): State<AppState>,
    body: Result<Json<SubmitReviewBody>, JsonRejection>,
) -> ApiResult<SubmissionReceipt> {
    let Json(body) = body.map_err(|rejection| {
        json_error(
            StatusCode::BAD_REQUEST,
            ApiError::new("Validation failed").with_detail("body", rejection.body_text()),
        )
    })?;

    match state.pipeline().submit(&body.rating, &body.review).await {
        Ok(receipt) => Ok((StatusCode::CREATED, Json(ApiSuccess::new(receipt)))),
        Err(SubmissionError::Validation(err)) => Err(validation_failed(&err)),
        Err(SubmissionError::Storage(_)) => Err(try_again_later(
            "Failed to process review",
            "processing your review",
        )),
    }
}

async fn list_reviews(
    State(state): State<AppState>,
    Query(params): Query<ReviewFilterParams>,
) -> ApiResult<ReviewListing> {
    let rating = params
        .rating()
        .map_err(|err| json_error(StatusCode::BAD_REQUEST, err))?;

    let listing = state.pipeline().query(rating).await.map_err(|err| {
        error!(?err, "failed to fetch reviews");
        try_again_later("Failed to fetch reviews", "fetching reviews")
    })?;

    Ok((StatusCode::OK, Json(ApiSuccess::new(listing))))
}

async fn review_stats(State(state): State<AppState>) -> ApiResult<StatsSummary> {
    let stats = state.pipeline().stats().await.map_err(|err| {
        error!(?err, "failed to fetch review statistics");
        try_again_later("Failed to fetch statistics", "fetching statistics")
    })?;

    Ok((
        StatusCode::OK,
        Json(ApiSuccess::new(StatsSummary {
            total: stats.total(),
            by_rating: stats,
        })),
    ))
}
