use serde_json::Value;
use thiserror::Error;

use super::{MAX_RATING, MAX_REVIEW_CHARS, MIN_RATING, ReviewSubmission};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Rating must be a whole number between 1 and 5")]
    InvalidRating,
    #[error("Review cannot be empty or contain only whitespace")]
    EmptyReview,
    #[error("Review too long (max 5000 characters, got {length})")]
    ReviewTooLong { length: usize },
}

impl ValidationError {
    /// Request field the error refers to.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::InvalidRating => "rating",
            ValidationError::EmptyReview | ValidationError::ReviewTooLong { .. } => "review",
        }
    }
}

/// Every field problem found in one submission, in field order. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }
}

/// Checks a raw submission and returns the normalized rating and trimmed text.
///
/// The rating accepts JSON integers and integral floats (`4.0`); strings,
/// fractions and anything outside 1..=5 are rejected. Text length is counted
/// in characters after trimming. Both fields are always checked so the
/// caller can report every problem at once.
pub fn validate(raw_rating: &Value, raw_text: &Value) -> Result<ReviewSubmission, ValidationErrors> {
    let rating = parse_rating(raw_rating).ok_or(ValidationError::InvalidRating);
    let text = review_text(raw_text);

    match (rating, text) {
        (Ok(rating), Ok(text)) => Ok(ReviewSubmission { rating, text }),
        (rating, text) => Err(ValidationErrors(
            [rating.err(), text.err()].into_iter().flatten().collect(),
        )),
    }
}

fn parse_rating(raw: &Value) -> Option<i32> {
    let rating = match raw.as_i64() {
        Some(value) => value,
        None => {
            let value = raw.as_f64()?;
            if value.fract() != 0.0 {
                return None;
            }
            value as i64
        }
    };

    let rating = i32::try_from(rating).ok()?;
    (MIN_RATING..=MAX_RATING).contains(&rating).then_some(rating)
}

fn review_text(raw: &Value) -> Result<String, ValidationError> {
    let text = raw
        .as_str()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .ok_or(ValidationError::EmptyReview)?;

    let length = text.chars().count();
    if length > MAX_REVIEW_CHARS {
        return Err(ValidationError::ReviewTooLong { length });
    }
    Ok(text.to_string())
}
