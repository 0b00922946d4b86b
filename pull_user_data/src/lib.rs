use async_trait::async_trait;
use aws_sdk_connect as connect;
use aws_sdk_connect::primitives::DateTime;
use aws_sdk_connect::types::{UserData, UserDataFilters};
use connect_sync::connect::resource_id;
use connect_sync::tables::{METADATA_TABLE, USER_DATA_TABLE};
use connect_sync::{
    ConnectMetadata, Fetcher, Page, PageSource, ResourceKind, Row, RowBuilder, SourceError, Store, SyncError,
    SyncPipeline, SyncRecord, SyncReport, TableSpec, WriteMode, MAX_FILTER_KEYS,
};
use tracing::{debug, info};

/// Written when a name is not in `connect_metadata`.
pub const UNKNOWN_NAME: &str = "NA";

pub const USER_DATA: TableSpec = TableSpec {
    table: USER_DATA_TABLE,
    columns: &[
        "user_arn",
        "user_name",
        "routing_profile_arn",
        "routing_profile_name",
        "status_name",
        "status_start_time",
    ],
    mode: WriteMode::Upsert,
};

/// What an agent is doing right now.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AgentState {
    pub user_arn: String,
    pub routing_profile_arn: Option<String>,
    pub status_arn: Option<String>,
    /// `YYYY-MM-DD HH:MM:SS` in UTC.
    pub status_start_time: Option<String>,
}

impl SyncRecord for AgentState {
    fn key(&self) -> &str {
        &self.user_arn
    }
}

pub fn format_timestamp(at: &DateTime) -> Option<String> {
    chrono::DateTime::from_timestamp(at.secs(), at.subsec_nanos())
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn agent_state(data: &UserData) -> Result<AgentState, SourceError> {
    let user_arn = data
        .user()
        .and_then(|u| u.arn())
        .ok_or_else(|| SourceError::InvalidResponse {
            operation: "GetCurrentUserData",
            reason: String::from("user data without a user arn"),
        })?;
    Ok(AgentState {
        user_arn: user_arn.to_string(),
        routing_profile_arn: data.routing_profile().and_then(|rp| rp.arn()).map(str::to_string),
        status_arn: data.status().and_then(|s| s.status_arn()).map(str::to_string),
        status_start_time: data
            .status()
            .and_then(|s| s.status_start_timestamp())
            .and_then(format_timestamp),
    })
}

/// `GetCurrentUserData` filtered by agent id.
pub struct UserDataSource {
    client: connect::Client,
    instance_id: String,
}

impl UserDataSource {
    pub fn new(client: connect::Client, instance_id: impl Into<String>) -> Self {
        Self {
            client,
            instance_id: instance_id.into(),
        }
    }
}

#[async_trait]
impl PageSource for UserDataSource {
    type Item = AgentState;

    fn operation(&self) -> &'static str {
        "GetCurrentUserData"
    }

    async fn fetch_page(&self, filter: &[String], next_token: Option<String>) -> Result<Page<AgentState>, SourceError> {
        let out = self
            .client
            .get_current_user_data()
            .instance_id(&self.instance_id)
            .filters(UserDataFilters::builder().set_agents(Some(filter.to_vec())).build())
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| SourceError::from_sdk(self.operation(), e))?;
        if out.user_data_list().is_empty() {
            info!("No user data available");
        }
        let items = out
            .user_data_list()
            .iter()
            .map(agent_state)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            items,
            next_token: out.next_token().map(str::to_string),
        })
    }
}

/// Builds a `current_user_data` row, resolving the user, routing profile and
/// status names from `connect_metadata` one lookup at a time.
pub struct NameResolver<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: Store + ?Sized> NameResolver<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    async fn name_of(&self, arn: Option<&str>, kind: ResourceKind) -> Result<String, SyncError> {
        let Some(arn) = arn else {
            return Ok(UNKNOWN_NAME.to_string());
        };
        let name = self.store.lookup_name(METADATA_TABLE, arn, kind.arn_type()).await?;
        debug!("{} {} >> {:?}", kind.arn_type(), arn, name);
        Ok(name.unwrap_or_else(|| UNKNOWN_NAME.to_string()))
    }
}

#[async_trait]
impl<'a, S: Store + ?Sized> RowBuilder<AgentState> for NameResolver<'a, S> {
    async fn build_row(&self, state: &AgentState) -> Result<Row, SyncError> {
        let user_name = self.name_of(Some(state.user_arn.as_str()), ResourceKind::User).await?;
        let routing_profile_name = self
            .name_of(state.routing_profile_arn.as_deref(), ResourceKind::RoutingProfile)
            .await?;
        let status_name = self.name_of(state.status_arn.as_deref(), ResourceKind::AgentStatus).await?;
        Ok(vec![
            state.user_arn.as_str().into(),
            user_name.into(),
            state.routing_profile_arn.clone().into(),
            routing_profile_name.into(),
            status_name.into(),
            state.status_start_time.clone().into(),
        ])
    }
}

/// List the users, pull the state of every agent 100 at a time and upsert one
/// row per agent into `current_user_data`.
pub async fn pull_user_data<U, D, S>(fetcher: &Fetcher, users: &U, user_data: &D, store: &S) -> Result<SyncReport, SyncError>
where
    U: PageSource<Item = ConnectMetadata>,
    D: PageSource<Item = AgentState>,
    S: Store + ?Sized,
{
    let users = fetcher.fetch_all(users, &[]).await?;
    let agents: Vec<String> = users.iter().map(|u| resource_id(&u.arn).to_string()).collect();
    info!("Number of agents: {}", agents.len());

    let states = fetcher.fetch_chunked(user_data, &agents, MAX_FILTER_KEYS).await?;
    SyncPipeline::new(store, USER_DATA, NameResolver::new(store))
        .run(states)
        .await
}
