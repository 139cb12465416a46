pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod notify;
pub mod pipeline;

use std::sync::Arc;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use api::{start_api_server, ApiContext};
use config::{AppConfig, ConfigError};
use db::{DatabaseError, SqliteRiskStore};
use notify::{LogNotifier, Notifier, OutboxNotifier};
use pipeline::{
    DirectoryDocumentStore, HazardTaxonomy, InferenceError, ModelInvoker, OpenAiClient,
    PromptRegistry, ReportService, RiskPipeline, ServiceSettings,
};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Cannot create inference client: {0}")]
    Inference(#[from] InferenceError),

    #[error("Cannot open report database: {0}")]
    Database(#[from] DatabaseError),

    #[error("Cannot create log directory: {0}")]
    Logging(std::io::Error),

    #[error(transparent)]
    Server(#[from] api::server::ServerError),

    #[error("Startup task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Install the global subscriber: human-readable lines on stderr, plus a
/// daily-rolling JSON `app.log` when `[logging] dir` is set. Keep the
/// returned guard alive or buffered file lines are lost.
pub fn init_tracing(config: &AppConfig) -> Result<Option<WorkerGuard>, StartupError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = match &config.logging.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(StartupError::Logging)?;
            let appender = tracing_appender::rolling::daily(dir, "app.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_target(false)
                .json();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(guard)
}

/// Wire the pipeline, store and notifier from configuration.
///
/// Blocking: creates the blocking HTTP client and runs migrations.
pub fn build_service(config: &AppConfig) -> Result<ReportService, StartupError> {
    let api_key = config
        .inference
        .api_key
        .as_deref()
        .ok_or(ConfigError::MissingApiKey)?;
    let client = OpenAiClient::new(
        &config.inference.base_url,
        api_key,
        config.inference.timeout_secs,
    )?;

    let taxonomy = HazardTaxonomy::from_config(&config.taxonomy);
    if taxonomy.is_empty() {
        return Err(ConfigError::Invalid("taxonomy has no usable categories".into()).into());
    }
    let categories = taxonomy.len();
    let taxonomy = Arc::new(taxonomy);
    let registry = Arc::new(PromptRegistry::new(&taxonomy));
    let invoker = ModelInvoker::new(Box::new(client), registry, &config.inference.model);
    let documents = DirectoryDocumentStore::new(&config.documents.dir);
    let documents_dir = documents.dir().to_path_buf();
    let pipeline = RiskPipeline::new(
        invoker,
        taxonomy,
        Box::new(documents),
        config.server.max_upload_bytes,
    );

    let store = Arc::new(SqliteRiskStore::open(&config.storage.db_path)?);
    let notifier: Box<dyn Notifier + Send + Sync> = match &config.notification.recipient {
        Some(_) => Box::new(OutboxNotifier::new(store.clone())),
        None => {
            tracing::warn!("No notification recipient configured; notifications are only logged");
            Box::new(LogNotifier)
        }
    };

    tracing::info!(
        model = %config.inference.model,
        base_url = %config.inference.base_url,
        db = %store.db_path().display(),
        documents = %documents_dir.display(),
        categories,
        "Report service ready"
    );

    Ok(ReportService::new(
        pipeline,
        store,
        notifier,
        ServiceSettings {
            author: config.storage.author.clone(),
            recipient: config.notification.recipient.clone(),
            subject: config.notification.subject.clone(),
        },
    ))
}

/// Load config, start the server, and run until Ctrl-C.
pub async fn run() -> Result<(), StartupError> {
    let config = AppConfig::load()?;
    let _guard = init_tracing(&config)?;

    tracing::info!("Nearmiss starting v{}", config::APP_VERSION);

    let max_upload_bytes = config.server.max_upload_bytes;
    let bind = config.server.bind.clone();
    let service = tokio::task::spawn_blocking(move || build_service(&config)).await??;

    let ctx = ApiContext::new(Arc::new(service), max_upload_bytes);
    let mut server = start_api_server(ctx, &bind).await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for Ctrl-C: {e}");
    }
    server.shutdown();
    server.wait().await?;
    Ok(())
}
