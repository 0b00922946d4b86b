use aws_lambda_events::event::cloudwatch_events::CloudWatchEvent;
use aws_sdk_connect as connect;
use connect_sync::{
    connect_client, load_sdk_config, ConnectionManager, DbConfig, Fetcher, MetadataSource, MySqlStore, ResourceKind,
    SourceConfig, SyncReport,
};
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use pull_historical_metrics::{pull_historical_metrics, HistoricalMetricsSource, Window};
use tracing::{debug, error, info};

const TRACE_DEBUG: &str = "TRACE_DEBUG";

struct Shared {
    fetcher: Fetcher,
    client: connect::Client,
    source_config: SourceConfig,
    queues: MetadataSource,
    store: MySqlStore,
}

async fn function_handler(shared: &Shared, event: LambdaEvent<CloudWatchEvent>) -> Result<SyncReport, Error> {
    debug!("event: {:?}", event.payload);
    let window = Window::now(shared.source_config.reporting_interval_minutes);
    info!("Reporting window {} - {}", window.start, window.end);
    let metrics = HistoricalMetricsSource::new(shared.client.clone(), shared.source_config.instance_id.clone(), window);
    pull_historical_metrics(&shared.fetcher, &shared.queues, &metrics, &shared.store)
        .await
        .map_err(|e| {
            error!("pull_historical_metrics failed: {}", e);
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
        client,
        source_config,
        store: MySqlStore::new(ConnectionManager::new(db_config, sdk_config)),
    };
    let shared = &shared;

    run(service_fn(move |event: LambdaEvent<CloudWatchEvent>| async move {
        function_handler(shared, event).await
    }))
    .await
}
