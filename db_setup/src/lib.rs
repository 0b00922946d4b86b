//! CloudFormation custom resource that creates the reporting database and
//! applies its DDL scripts.

use async_trait::async_trait;
use connect_sync::{ConnectionManager, DbError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info};

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct SetupProperties {
    #[serde(default)]
    pub db_name: String,
    /// JSON array of SQL scripts, applied in order.
    #[serde(default)]
    pub setup_script_json: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct CustomResourceEvent {
    pub request_type: RequestType,
    #[serde(default)]
    pub physical_resource_id: Option<String>,
    #[serde(default)]
    pub resource_properties: SetupProperties,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceStatus {
    Success,
    Failed,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CustomResourceResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    pub data: Map<String, Value>,
    pub status: ResourceStatus,
}

#[derive(Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("SetupScriptJson is not a JSON array of strings: {0}")]
    Scripts(#[from] serde_json::Error),
}

/// The database the setup is applied to.
#[async_trait]
pub trait SchemaTarget: Send + Sync {
    async fn create_database(&self) -> Result<(), DbError>;

    async fn apply_script(&self, script: &str) -> Result<(), DbError>;
}

fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

#[async_trait]
impl SchemaTarget for ConnectionManager {
    async fn create_database(&self) -> Result<(), DbError> {
        let sql = format!("CREATE DATABASE IF NOT EXISTS {};", quote_identifier(&self.config().database));
        // the database may not exist yet, so connect without one
        self.run_script(None, &sql).await
    }

    async fn apply_script(&self, script: &str) -> Result<(), DbError> {
        self.run_script(Some(self.config().database.as_str()), script).await
    }
}

async fn setup<T>(target: &T, properties: &SetupProperties) -> Result<(), SetupError>
where
    T: SchemaTarget + ?Sized,
{
    let scripts: Vec<String> = serde_json::from_str(&properties.setup_script_json)?;
    info!("Creating database...");
    target.create_database().await?;
    info!("Running {} ddl scripts...", scripts.len());
    for script in &scripts {
        target.apply_script(script).await?;
    }
    Ok(())
}

/// Answer a custom resource request. Failures are reported in the response
/// status rather than as an error, so the stack sees FAILED instead of timing out.
pub async fn handle_request<T>(target: &T, event: &CustomResourceEvent) -> CustomResourceResponse
where
    T: SchemaTarget + ?Sized,
{
    let db_name = &event.resource_properties.db_name;
    match event.request_type {
        RequestType::Delete => {
            info!("Delete leaves database {} in place", db_name);
            CustomResourceResponse {
                physical_resource_id: event.physical_resource_id.clone().or_else(|| Some(db_name.clone())),
                data: Map::new(),
                status: ResourceStatus::Success,
            }
        }
        RequestType::Create | RequestType::Update => match setup(target, &event.resource_properties).await {
            Ok(()) => {
                let mut data = Map::new();
                data.insert(String::from("DbName"), Value::String(db_name.clone()));
                CustomResourceResponse {
                    physical_resource_id: Some(db_name.clone()),
                    data,
                    status: ResourceStatus::Success,
                }
            }
            Err(e) => {
                error!("database setup failed: {}", e);
                CustomResourceResponse {
                    physical_resource_id: None,
                    data: Map::new(),
                    status: ResourceStatus::Failed,
                }
            }
        },
    }
}
