use connect_sync::{
    connect_client, load_sdk_config, ConnectionManager, DbConfig, Fetcher, MetadataSource, MySqlStore, ResourceKind,
    SourceConfig, SyncReport,
};
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use pull_current_metrics::{pull_current_metrics, CurrentMetricsSource};
use serde_json::Value;
use tracing::{debug, error};

const TRACE_DEBUG: &str = "TRACE_DEBUG";

struct Shared {
    fetcher: Fetcher,
    queues: MetadataSource,
    metrics: CurrentMetricsSource,
    store: MySqlStore,
}

/// Runs on a schedule and from the polling step, so the payload is not read.
async fn function_handler(shared: &Shared, event: LambdaEvent<Value>) -> Result<SyncReport, Error> {
    debug!("event: {}", event.payload);
    pull_current_metrics(&shared.fetcher, &shared.queues, &shared.metrics, &shared.store)
        .await
        .map_err(|e| {
            error!("pull_current_metrics failed: {}", e);
            e.into()
        })
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(match std::env::var(TRACE_DEBUG) {
            Ok(_) => tracing::Level::DEBUG,
            Err(_) => tracing::Level::INFO,
        })
        // disable printing the name of the module in every log line.
        .with_target(false)
        // disabling time is handy because CloudWatch will add the ingestion time.
        .without_time()
        .init();

    let db_config = DbConfig::from_env()?;
    let source_config = SourceConfig::from_env()?;
    let sdk_config = load_sdk_config(db_config.region.as_deref()).await;
    let client = connect_client(&sdk_config);
    let shared = Shared {
        fetcher: Fetcher::default(),
        queues: MetadataSource::new(client.clone(), source_config.instance_id.clone(), ResourceKind::Queue),
        metrics: CurrentMetricsSource::new(client, source_config.instance_id),
        store: MySqlStore::new(ConnectionManager::new(db_config, sdk_config)),
    };
    let shared = &shared;

    run(service_fn(move |event: LambdaEvent<Value>| async move {
        function_handler(shared, event).await
    }))
    .await
}
