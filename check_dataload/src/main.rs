use check_dataload::dataload_response;
use connect_sync::{load_sdk_config, ConnectionManager, DbConfig, MySqlStore};
use lambda_http::{run, service_fn, Body, Error, Request, Response};
use tracing::debug;

const TRACE_DEBUG: &str = "TRACE_DEBUG";

async fn function_handler(store: &MySqlStore, event: Request) -> Result<Response<Body>, Error> {
    debug!("request: {:?}", event);
    dataload_response(store).await
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
    let store = MySqlStore::new(ConnectionManager::new(db_config, sdk_config));
    let store = &store;

    run(service_fn(move |event: Request| async move {
        function_handler(store, event).await
    }))
    .await
}
