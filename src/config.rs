use std::{env, str::FromStr, time::Duration};

use anyhow::{Context, Result};

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_REVIEW_MODEL: &str = "openai/gpt-3.5-turbo";
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 30;

/// Process-wide configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub port: u16,
    pub allowed_origins: AllowedOrigins,
    pub llm: LlmSettings,
    pub generation: GenerationSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL env var is missing")?;
        let openrouter_api_key =
            env::var("OPENROUTER_API_KEY").context("OPENROUTER_API_KEY env var is missing")?;

        let port = parse_env("PORT")?.unwrap_or(DEFAULT_PORT);
        let max_connections =
            parse_env("DATABASE_MAX_CONNECTIONS")?.unwrap_or(DEFAULT_MAX_CONNECTIONS);
        let timeout_secs = parse_env("LLM_TIMEOUT_SECS")?.unwrap_or(DEFAULT_LLM_TIMEOUT_SECS);

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .map(|raw| AllowedOrigins::parse(&raw))
            .unwrap_or(AllowedOrigins::Any);

        let generation = GenerationSettings {
            model: env::var("REVIEW_MODEL").unwrap_or_else(|_| DEFAULT_REVIEW_MODEL.to_string()),
            ..GenerationSettings::default()
        };

        Ok(Self {
            database_url,
            max_connections,
            port,
            allowed_origins,
            llm: LlmSettings {
                openrouter_api_key,
                openrouter_referer: env::var("OPENROUTER_HTTP_REFERER").ok(),
                openrouter_title: env::var("OPENROUTER_X_TITLE").ok(),
                timeout: Duration::from_secs(timeout_secs),
            },
            generation,
        })
    }
}

fn parse_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    parse_setting(key, env::var(key).ok())
}

/// Unset or blank means "use the default"; anything else must parse.
fn parse_setting<T>(key: &str, raw: Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.filter(|value| !value.trim().is_empty())
        .map(|value| {
            value
                .trim()
                .parse()
                .with_context(|| format!("{key} has an invalid value {value:?}"))
        })
        .transpose()
}

/// CORS origin policy. `*` anywhere in the list means any origin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

impl AllowedOrigins {
    pub fn parse(raw: &str) -> Self {
        let origins: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
            AllowedOrigins::Any
        } else {
            AllowedOrigins::List(origins)
        }
    }
}

/// Connection settings for the OpenRouter client.
#[derive(Clone, Debug)]
pub struct LlmSettings {
    pub openrouter_api_key: String,
    pub openrouter_referer: Option<String>,
    pub openrouter_title: Option<String>,
    pub timeout: Duration,
}

/// Model and sampling parameters for the two generation calls.
#[derive(Clone, Debug)]
pub struct GenerationSettings {
    pub model: String,
    pub user_reply: CallSettings,
    pub admin_analysis: CallSettings,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_REVIEW_MODEL.to_string(),
            user_reply: CallSettings {
                temperature: 0.7,
                max_tokens: 150,
            },
            admin_analysis: CallSettings {
                temperature: 0.3,
                max_tokens: 200,
            },
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CallSettings {
    pub temperature: f32,
    pub max_tokens: u32,
}
