use aws_sdk_lambda as lambda;
use aws_sdk_lambda::types::InvocationType;
use connect_sync::config::required;
use connect_sync::ConfigError;
use lambda_runtime::Error;
use serde::{Deserialize, Serialize};
use tracing::info;

const TARGET_LAMBDA_ARN: &str = "TARGET_LAMBDA_ARN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    /// Function kicked off on every iteration.
    pub target_arn: String,
}

impl JobConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            target_arn: required(TARGET_LAMBDA_ARN)?,
        })
    }
}

/// Iteration state carried between polling steps.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PollState {
    pub index: u64,
    pub max_num_of_runs: u64,
}

pub fn next_iteration(state: &PollState) -> PollState {
    PollState {
        index: state.index.saturating_add(1),
        max_num_of_runs: state.max_num_of_runs,
    }
}

/// Fire and forget: the target runs asynchronously and its result is not awaited.
pub async fn invoke_target(client: &lambda::Client, target_arn: &str) -> Result<(), Error> {
    let resp = client
        .invoke()
        .function_name(target_arn)
        .invocation_type(InvocationType::Event)
        .send()
        .await?;
    info!("Invocation of {} answered {}", target_arn, resp.status_code());
    Ok(())
}

pub async fn run_iteration(client: &lambda::Client, config: &JobConfig, state: PollState) -> Result<PollState, Error> {
    invoke_target(client, &config.target_arn).await?;
    let next = next_iteration(&state);
    info!("Response: {:?}", next);
    Ok(next)
}
