use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::LlmSettings;

const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Text completion seam used by the review pipeline.
///
/// Any error or empty reply is treated the same way by callers, so
/// implementations do not need to classify failures.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String>;
}

/// Defines the shape of a chat-style interaction with an LLM.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl LlmRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = Some(temperature);
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Individual chat message, compatible with OpenAI compliant providers.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub text: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// Chat roles sent to the provider. Review prompts are self-contained user turns.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MessageRole {
    User,
}

impl MessageRole {
    fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
        }
    }
}

/// Captures basic token usage metrics associated with a call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub prompt_tokens: usize,
    pub response_tokens: usize,
    pub total_tokens: usize,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub token_usage: TokenUsage,
    pub model: String,
}

/// OpenRouter chat-completions client.
#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    api_key: String,
    referer: Option<String>,
    title: Option<String>,
    model: String,
}

impl LlmClient {
    pub fn new(settings: &LlmSettings, model: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            api_key: settings.openrouter_api_key.clone(),
            referer: settings.openrouter_referer.clone(),
            title: settings.openrouter_title.clone(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn execute(&self, request: LlmRequest) -> Result<LlmResponse> {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|msg| {
                serde_json::json!({
                    "role": msg.role.as_str(),
                    "content": msg.text,
                })
            })
            .collect();

        let mut payload = serde_json::json!({
            "model": request.model,
            "messages": messages,
        });
        if let Some(temperature) = request.temperature {
            payload["temperature"] = serde_json::json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            payload["max_tokens"] = serde_json::json!(max_tokens);
        }

        let mut req_builder = self
            .http
            .post(format!("{OPENROUTER_BASE_URL}/chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&payload);

        if let Some(referer) = &self.referer {
            req_builder = req_builder.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.title {
            req_builder = req_builder.header("X-Title", title);
        }

        let response = req_builder
            .send()
            .await
            .context("OpenRouter request failed")?;
        let status = response.status();
        let response_text = response.text().await.context("failed to read response body")?;
        let body: serde_json::Value = serde_json::from_str(&response_text).with_context(|| {
            format!(
                "failed to parse OpenRouter response as JSON. Response body: {}",
                preview(&response_text)
            )
        })?;
        if !status.is_success() {
            bail!("openrouter call failed with status {}: {}", status, body);
        }

        let (text, usage) = extract_text_and_usage(&body)
            .ok_or_else(|| anyhow!("unexpected OpenRouter response payload: {}", body))?;

        let prompt_tokens = approximate_token_count(
            &request
                .messages
                .iter()
                .map(|m| m.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        );
        let mut token_usage = usage.unwrap_or_default();
        if token_usage.prompt_tokens == 0 {
            token_usage.prompt_tokens = prompt_tokens;
        }
        if token_usage.response_tokens == 0 {
            token_usage.response_tokens = approximate_token_count(&text);
        }
        token_usage.total_tokens = token_usage.prompt_tokens + token_usage.response_tokens;

        Ok(LlmResponse {
            text,
            token_usage,
            model: request.model,
        })
    }

    /// Confirms the API key is accepted by listing the provider's models.
    pub async fn validate_connection(&self) -> Result<()> {
        let response = self
            .http
            .get(format!("{OPENROUTER_BASE_URL}/models"))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("OpenRouter models request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("openrouter models listing failed with status {status}");
        }
        Ok(())
    }
}

#[async_trait]
impl CompletionService for LlmClient {
    async fn complete(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String> {
        let request = LlmRequest::new(
            self.model.clone(),
            vec![ChatMessage::new(MessageRole::User, prompt)],
        )
        .with_sampling(temperature, max_tokens);

        let response = self.execute(request).await?;
        tracing::debug!(
            model = %response.model,
            tokens = response.token_usage.total_tokens,
            "completion received"
        );
        completion_text(response)
    }
}

/// A blank completion is reported as an error like any other provider failure.
fn completion_text(response: LlmResponse) -> Result<String> {
    if response.text.trim().is_empty() {
        bail!("model {} returned an empty completion", response.model);
    }
    Ok(response.text)
}

fn preview(body: &str) -> String {
    const LIMIT: usize = 500;
    match body.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Extract assistant text and optional usage metrics from either Responses or Chat Completions payloads.
fn extract_text_and_usage(value: &serde_json::Value) -> Option<(String, Option<TokenUsage>)> {
    if let Ok(resp) = serde_json::from_value::<ResponsesPayload>(value.clone()) {
        if !resp.output.is_empty() {
            let text = resp
                .output
                .into_iter()
                .filter(|item| item.item_type == "message")
                .flat_map(|item| item.content)
                .find_map(|content| match content.content_type.as_str() {
                    "output_text" | "text" => Some(content.text.unwrap_or_default()),
                    _ => None,
                })
                .unwrap_or_default();

            return Some((text, resp.usage.map(UsagePayload::into_usage)));
        }
    }

    if let Ok(chat) = serde_json::from_value::<ChatCompletionPayload>(value.clone()) {
        if chat.choices.is_empty() {
            return None;
        }
        let text = chat
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .unwrap_or_default();

        return Some((text, chat.usage.map(UsagePayload::into_usage)));
    }

    None
}

fn approximate_token_count(input: &str) -> usize {
    input.split_whitespace().count()
}

#[derive(Debug, Deserialize)]
struct ResponsesPayload {
    #[serde(default)]
    output: Vec<ResponsesOutputItem>,
    #[serde(default)]
    usage: Option<UsagePayload>,
}

#[derive(Debug, Deserialize)]
struct ResponsesOutputItem {
    #[serde(rename = "type")]
    item_type: String,
    #[serde(default)]
    content: Vec<ResponsesOutputContent>,
}

#[derive(Debug, Deserialize)]
struct ResponsesOutputContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionPayload {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<UsagePayload>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsagePayload {
    #[serde(default)]
    prompt_tokens: Option<usize>,
    #[serde(default)]
    completion_tokens: Option<usize>,
    #[serde(default)]
    total_tokens: Option<usize>,
}

impl UsagePayload {
    fn into_usage(self) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens.unwrap_or_default(),
            response_tokens: self.completion_tokens.unwrap_or_default(),
            total_tokens: self.total_tokens.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_chat_completion_text_and_usage() {
        let body = json!({
            "choices": [{ "message": { "content": "Thanks for the feedback!" } }],
            "usage": { "prompt_tokens": 40, "completion_tokens": 5, "total_tokens": 45 }
        });

        let (text, usage) = extract_text_and_usage(&body).unwrap();
        assert_eq!(text, "Thanks for the feedback!");
        let usage = usage.unwrap();
        assert_eq!(usage.prompt_tokens, 40);
        assert_eq!(usage.response_tokens, 5);
    }

    #[test]
    fn extracts_responses_output_text() {
        let body = json!({
            "output": [
                { "type": "reasoning", "content": [] },
                { "type": "message", "content": [{ "type": "output_text", "text": "SUMMARY: ok" }] }
            ]
        });

        let (text, usage) = extract_text_and_usage(&body).unwrap();
        assert_eq!(text, "SUMMARY: ok");
        assert!(usage.is_none());
    }

    #[test]
    fn null_content_yields_empty_text() {
        let body = json!({ "choices": [{ "message": { "content": null } }] });
        let (text, _) = extract_text_and_usage(&body).unwrap();
        assert!(text.is_empty());
    }

    fn response_with(text: &str) -> LlmResponse {
        LlmResponse {
            text: text.to_string(),
            token_usage: TokenUsage::default(),
            model: "openai/gpt-3.5-turbo".to_string(),
        }
    }

    #[test]
    fn blank_completion_is_an_error() {
        let err = completion_text(response_with("  \n ")).unwrap_err();
        assert!(err.to_string().contains("empty completion"));
        assert!(completion_text(response_with("")).is_err());
    }

    #[test]
    fn non_blank_completion_is_returned_as_is() {
        assert_eq!(
            completion_text(response_with(" Thanks! ")).unwrap(),
            " Thanks! "
        );
    }

    #[test]
    fn error_payload_is_not_extracted() {
        let body = json!({ "error": { "message": "rate limited" } });
        assert!(extract_text_and_usage(&body).is_none());
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "é".repeat(600);
        let shown = preview(&long);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), 503);
    }
}
