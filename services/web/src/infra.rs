use listing_review::config::AppConfig;
use listing_review::error::AppError;
use listing_review::ingestion::{DisabledIngestor, FeedIngestor, IngestMode, Ingestor};
use listing_review::notification::{Notifier, OutboxNotifier};
use listing_review::review::ReviewWorkflow;
use listing_review::settings::SettingsStore;
use listing_review::store::SqliteStore;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

/// Shared handles injected into every route.
#[derive(Clone)]
pub struct AppState {
    pub readiness: Arc<AtomicBool>,
    pub metrics: Arc<PrometheusHandle>,
    pub workflow: Arc<ReviewWorkflow<SqliteStore>>,
    pub settings: SettingsStore,
    pub ingestor: Arc<dyn Ingestor>,
    pub notifier: Arc<dyn Notifier>,
    pub ingest_mode: IngestMode,
}

/// Open the data directory and database, returning the review workflow over it.
pub(crate) async fn open_workflow(
    config: &AppConfig,
) -> Result<Arc<ReviewWorkflow<SqliteStore>>, AppError> {
    tokio::fs::create_dir_all(&config.storage.data_dir).await?;
    let store = Arc::new(SqliteStore::connect(&config.storage.database_url).await?);
    Ok(Arc::new(ReviewWorkflow::new(
        store,
        config.review.alert_max_travel_minutes,
    )))
}

/// Wire the store, settings, and collaborators from configuration.
pub(crate) async fn build_state(
    config: &AppConfig,
    metrics: PrometheusHandle,
) -> Result<AppState, AppError> {
    let workflow = open_workflow(config).await?;
    let settings = SettingsStore::new(config.storage.settings_path());

    let ingestor: Arc<dyn Ingestor> = match &config.ingestion.feed_url {
        Some(url) => {
            info!(feed = %url, channel = %config.ingestion.channel, "listing feed configured");
            Arc::new(FeedIngestor::new(
                url.clone(),
                workflow.store().clone(),
                config.review.alert_max_travel_minutes,
            )?)
        }
        None => {
            info!("no listing feed configured; download is disabled");
            Arc::new(DisabledIngestor)
        }
    };

    let notifier: Arc<dyn Notifier> = Arc::new(OutboxNotifier::new(
        workflow.clone(),
        settings.clone(),
        config.storage.data_dir.clone(),
    ));

    Ok(AppState {
        readiness: Arc::new(AtomicBool::new(false)),
        metrics: Arc::new(metrics),
        workflow,
        settings,
        ingestor,
        notifier,
        ingest_mode: config.ingestion.channel,
    })
}
