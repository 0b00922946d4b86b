use connect_sync::{load_sdk_config, ConnectionManager, DbConfig};
use db_setup::{handle_request, CustomResourceEvent, CustomResourceResponse};
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use tracing::info;

const TRACE_DEBUG: &str = "TRACE_DEBUG";

async fn function_handler(
    db: &ConnectionManager,
    event: LambdaEvent<CustomResourceEvent>,
) -> Result<CustomResourceResponse, Error> {
    info!("{:?} request for {}", event.payload.request_type, event.payload.resource_properties.db_name);
    let resp = handle_request(db, &event.payload).await;
    info!("Response: {:?}", resp);
    Ok(resp)
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
    let sdk_config = load_sdk_config(db_config.region.as_deref()).await;
    let db = ConnectionManager::new(db_config, sdk_config);
    let db = &db;

    run(service_fn(move |event: LambdaEvent<CustomResourceEvent>| async move {
        function_handler(db, event).await
    }))
    .await
}
