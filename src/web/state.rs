use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::{info, warn};

use crate::{
    config::AppConfig,
    llm::LlmClient,
    reviews::{PgReviewStore, ResponseGenerator, SubmissionPipeline},
};

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<SubmissionPipeline>,
}

impl AppState {
    pub fn new(pipeline: SubmissionPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn pipeline(&self) -> &SubmissionPipeline {
        &self.pipeline
    }
}

/// Opens the pool and applies pending migrations.
pub async fn connect_database(config: &AppConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run database migrations")?;

    info!("database initialized");
    Ok(pool)
}

/// Wires the OpenRouter client and Postgres store into a pipeline.
pub async fn build_pipeline(config: &AppConfig, pool: PgPool) -> Result<SubmissionPipeline> {
    let llm_client = LlmClient::new(&config.llm, config.generation.model.clone())
        .context("failed to initialize LLM client")?;

    match llm_client.validate_connection().await {
        Ok(()) => info!(model = llm_client.model(), "LLM API connection validated"),
        Err(err) => warn!(
            ?err,
            "LLM API connection check failed; fallback replies will be used"
        ),
    }

    let generator = ResponseGenerator::new(Arc::new(llm_client), config.generation.clone());
    let store = Arc::new(PgReviewStore::new(pool));

    Ok(SubmissionPipeline::new(generator, store))
}
