use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::warn;

use super::{GeneratedResponse, RatingTier};
use crate::{config::GenerationSettings, llm::CompletionService};

const RATING_RUBRIC: &str = r#"You are an expert review analyst. Use the following rubric to understand customer sentiment:

RATING RUBRIC:
★ 1 Star: Extremely negative sentiment, mentions of terrible service/quality, words like "worst", "awful", "never again"
★★ 2 Stars: Mostly negative, disappointed, multiple complaints, minimal positive aspects
★★★ 3 Stars: Mixed/neutral sentiment, both positives and negatives mentioned, "okay" or "average"
★★★★ 4 Stars: Mostly positive, generally satisfied, minor issues mentioned, would recommend
★★★★★ 5 Stars: Extremely positive, enthusiastic, words like "amazing", "perfect", "best", strong recommendation"#;

const EXCERPT_CHARS: usize = 100;

static SUMMARY_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)SUMMARY:\s*(.*?)\s*(?:ACTION:|\z)").ok());
static ACTION_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)ACTION:\s*(.*)").ok());

/// Produces the user reply and admin analysis for a review.
///
/// Generation never fails: provider errors, empty replies and unusable
/// output are replaced field by field with rating-tiered fallback text.
#[derive(Clone)]
pub struct ResponseGenerator {
    completions: Arc<dyn CompletionService>,
    settings: GenerationSettings,
}

impl ResponseGenerator {
    pub fn new(completions: Arc<dyn CompletionService>, settings: GenerationSettings) -> Self {
        Self {
            completions,
            settings,
        }
    }

    pub async fn generate(&self, rating: i32, text: &str) -> GeneratedResponse {
        let (user_response, (admin_summary, recommended_action)) = tokio::join!(
            self.user_response(rating, text),
            self.admin_analysis(rating, text)
        );

        GeneratedResponse {
            user_response,
            admin_summary,
            recommended_action,
        }
    }

    async fn user_response(&self, rating: i32, text: &str) -> String {
        let call = self.settings.user_reply;
        let prompt = user_reply_prompt(rating, text);

        match self
            .completions
            .complete(&prompt, call.temperature, call.max_tokens)
            .await
        {
            Ok(reply) => trimmed_reply(&reply).unwrap_or_else(|| {
                warn!(rating, "user reply came back empty; using fallback");
                fallback_user_response(rating).to_string()
            }),
            Err(err) => {
                warn!(?err, rating, "user reply generation failed; using fallback");
                fallback_user_response(rating).to_string()
            }
        }
    }

    async fn admin_analysis(&self, rating: i32, text: &str) -> (String, String) {
        let call = self.settings.admin_analysis;
        let prompt = admin_analysis_prompt(rating, text);

        let parsed = match self
            .completions
            .complete(&prompt, call.temperature, call.max_tokens)
            .await
        {
            Ok(reply) => {
                let parsed = parse_admin_analysis(&reply);
                if parsed.summary.is_none() || parsed.action.is_none() {
                    warn!(
                        rating,
                        has_summary = parsed.summary.is_some(),
                        has_action = parsed.action.is_some(),
                        "admin analysis incomplete; filling missing fields"
                    );
                }
                parsed
            }
            Err(err) => {
                warn!(?err, rating, "admin analysis generation failed; using fallback");
                AdminAnalysis::default()
            }
        };

        (
            parsed
                .summary
                .unwrap_or_else(|| fallback_admin_summary(rating, text)),
            parsed
                .action
                .unwrap_or_else(|| fallback_recommended_action(rating).to_string()),
        )
    }
}

fn user_reply_prompt(rating: i32, text: &str) -> String {
    let tone = match RatingTier::from_rating(rating) {
        RatingTier::Negative => "Apologizes and offers to resolve issues",
        RatingTier::Neutral => "Acknowledges both positives and areas for improvement",
        RatingTier::Positive => "Expresses gratitude for positive feedback",
    };

    format!(
        "{RATING_RUBRIC}

A customer left a {rating}-star review: \"{text}\"

Generate a personalized, empathetic response (2-3 sentences) that:
- Thanks them for their feedback
- Acknowledges their specific experience
- {tone}

Response:"
    )
}

fn admin_analysis_prompt(rating: i32, text: &str) -> String {
    format!(
        "{RATING_RUBRIC}

Review: {rating} stars - \"{text}\"

Provide:
1. SUMMARY: One sentence summarizing the key points and sentiment
2. ACTION: One specific, actionable recommendation for the business

Format:
SUMMARY: [your summary]
ACTION: [your recommendation]"
    )
}

#[derive(Debug, Default, PartialEq, Eq)]
struct AdminAnalysis {
    summary: Option<String>,
    action: Option<String>,
}

/// Pulls the `SUMMARY:` and `ACTION:` sections out of a model reply.
///
/// The summary runs up to the next `ACTION:` label or the end of the text.
/// Missing labels or blank sections yield `None` for that field only.
fn parse_admin_analysis(reply: &str) -> AdminAnalysis {
    let capture = |pattern: &Option<Regex>| -> Option<String> {
        pattern
            .as_ref()?
            .captures(reply)
            .and_then(|caps| caps.get(1))
            .and_then(|section| non_empty(section.as_str()))
    };

    AdminAnalysis {
        summary: capture(&*SUMMARY_PATTERN),
        action: capture(&*ACTION_PATTERN),
    }
}

/// Whitespace-trimmed reply text; `None` when nothing is left.
fn trimmed_reply(raw: &str) -> Option<String> {
    let cleaned = raw.trim();
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

/// Trims whitespace and stray markdown emphasis around a parsed section.
fn non_empty(raw: &str) -> Option<String> {
    let cleaned = raw.trim_matches(|c: char| c.is_whitespace() || c == '*');
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

pub fn fallback_user_response(rating: i32) -> &'static str {
    match RatingTier::from_rating(rating) {
        RatingTier::Negative => {
            "Thank you for your feedback. We sincerely apologize for your experience and would like to make things right. Please contact our support team so we can address your concerns."
        }
        RatingTier::Neutral => {
            "Thank you for your feedback. We appreciate you taking the time to share your experience and will use your input to improve our service."
        }
        RatingTier::Positive => {
            "Thank you so much for your positive feedback! We're thrilled to hear about your experience and look forward to serving you again soon."
        }
    }
}

pub fn fallback_recommended_action(rating: i32) -> &'static str {
    match RatingTier::from_rating(rating) {
        RatingTier::Negative => "Contact customer immediately to resolve issues and prevent churn.",
        RatingTier::Neutral => "Follow up to understand areas for improvement.",
        RatingTier::Positive => {
            "Thank customer and encourage them to share their positive experience."
        }
    }
}

pub fn fallback_admin_summary(rating: i32, text: &str) -> String {
    let excerpt: String = text.chars().take(EXCERPT_CHARS).collect();
    let ellipsis = if text.chars().count() > EXCERPT_CHARS {
        "..."
    } else {
        ""
    };
    format!("Customer gave {rating} stars. Review: \"{excerpt}{ellipsis}\"")
}
