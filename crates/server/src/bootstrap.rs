use std::sync::Arc;

use haulquote_agent::{ClientError, ModelClients};
use haulquote_core::config::{AppConfig, ConfigError};
use haulquote_core::estimator::PromptError;
use haulquote_core::retrieval::IndexError;
use haulquote_core::{ContextRetriever, EstimationPipeline, RuleCorpusIndex, VisionEstimator};
use haulquote_db::{
    connect_with_settings, migrations, DbPool, SqlBookingRepository, SqlRuleRepository,
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub index: Arc<RuleCorpusIndex>,
    pub pipeline: Arc<EstimationPipeline>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("model clients could not be built: {0}")]
    Clients(#[from] ClientError),
    #[error("rule index is unavailable: {0}")]
    Index(#[from] IndexError),
    #[error("estimator prompt template is invalid: {0}")]
    Prompt(#[from] PromptError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let clients = ModelClients::from_config(&config)?;
    bootstrap_with_clients(config, clients).await
}

/// Connects, migrates, loads or builds the rule index, and wires the estimation pipeline.
pub async fn bootstrap_with_clients(
    config: AppConfig,
    clients: ModelClients,
) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let rules = Arc::new(SqlRuleRepository::new(db_pool.clone()));
    let bookings = Arc::new(SqlBookingRepository::new(db_pool.clone()));
    let index = Arc::new(
        RuleCorpusIndex::build_or_load(
            config.index.directory.clone(),
            rules.as_ref(),
            clients.embedder.as_ref(),
        )
        .await?,
    );
    info!(
        event_name = "system.bootstrap.index_ready",
        correlation_id = "bootstrap",
        document_count = index.len(),
        directory = %index.directory().display(),
        "rule index ready"
    );

    let retriever = ContextRetriever::new(index.clone(), clients.embedder, config.index.top_k);
    let estimator = VisionEstimator::new(clients.vision, clients.images)?;
    let pipeline = Arc::new(EstimationPipeline::new(bookings, rules, retriever, estimator));

    Ok(Application { config, db_pool, index, pipeline })
}
