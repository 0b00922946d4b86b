use aws_lambda_events::event::cloudwatch_events::CloudWatchEvent;
use connect_sync::{
    connect_client, load_sdk_config, ConnectionManager, DbConfig, Fetcher, MetadataSource, MySqlStore, ResourceKind,
    SourceConfig, SyncReport,
};
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use pull_metadata::pull_metadata;
use tracing::{debug, error};

const TRACE_DEBUG: &str = "TRACE_DEBUG";

struct Shared {
    fetcher: Fetcher,
    sources: Vec<MetadataSource>,
    store: MySqlStore,
}

async fn function_handler(shared: &Shared, event: LambdaEvent<CloudWatchEvent>) -> Result<Vec<SyncReport>, Error> {
    debug!("event: {:?}", event.payload);
    match pull_metadata(&shared.fetcher, &shared.sources, &shared.store).await {
        Ok(reports) => Ok(reports),
        Err(e) => {
            error!("pull_metadata failed: {}", e);
            Err(e.into())
        }
    }
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
    let sources = [
        ResourceKind::RoutingProfile,
        ResourceKind::AgentStatus,
        ResourceKind::User,
        ResourceKind::Queue,
    ]
    .into_iter()
    .map(|kind| MetadataSource::new(client.clone(), source_config.instance_id.clone(), kind))
    .collect();
    let shared = Shared {
        fetcher: Fetcher::default(),
        sources,
        store: MySqlStore::new(ConnectionManager::new(db_config, sdk_config)),
    };
    let shared = &shared;

    run(service_fn(move |event: LambdaEvent<CloudWatchEvent>| async move {
        function_handler(shared, event).await
    }))
    .await
}
