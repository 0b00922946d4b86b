use aws_sdk_lambda as lambda;
use job_invocation::{run_iteration, JobConfig, PollState};
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use tracing::info;

const TRACE_DEBUG: &str = "TRACE_DEBUG";

struct Shared {
    client: lambda::Client,
    config: JobConfig,
}

async fn function_handler(shared: &Shared, event: LambdaEvent<PollState>) -> Result<PollState, Error> {
    info!("event: {:?}", event.payload);
    run_iteration(&shared.client, &shared.config, event.payload).await
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

    let config = JobConfig::from_env()?;
    let region = std::env::var("REGION").ok();
    let sdk_config = connect_sync::load_sdk_config(region.as_deref()).await;
    let shared = Shared {
        client: lambda::Client::new(&sdk_config),
        config,
    };
    let shared = &shared;

    run(service_fn(move |event: LambdaEvent<PollState>| async move {
        function_handler(shared, event).await
    }))
    .await
}
