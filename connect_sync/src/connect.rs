//! Amazon Connect client setup and the instance metadata listings shared by
//! every pull function.

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_connect as connect;
use aws_sdk_connect::config::retry::RetryConfig;
use aws_sdk_connect::types::{AgentStatusType, QueueType};
use serde::Serialize;
use tracing::warn;

use crate::error::SourceError;
use crate::fetch::{Page, PageSource};
use crate::reconcile::SyncRecord;

pub async fn load_sdk_config(region: Option<&str>) -> SdkConfig {
    let region_provider = RegionProviderChain::first_try(region.map(|r| Region::new(r.to_string())))
        .or_default_provider()
        .or_else("us-east-1");
    aws_config::defaults(BehaviorVersion::latest())
        .region(region_provider)
        .load()
        .await
}

/// Connect client with SDK retries off; page requests are retried by the fetcher.
pub fn connect_client(sdk_config: &SdkConfig) -> connect::Client {
    let config = connect::config::Builder::from(sdk_config)
        .retry_config(RetryConfig::standard().with_max_attempts(1))
        .build();
    connect::Client::from_conf(config)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Queue,
    RoutingProfile,
    AgentStatus,
    User,
}

impl ResourceKind {
    /// Value of the `arn_type` column.
    pub fn arn_type(&self) -> &'static str {
        match self {
            ResourceKind::Queue => "queue",
            ResourceKind::RoutingProfile => "routing profile",
            ResourceKind::AgentStatus => "agent status",
            ResourceKind::User => "users",
        }
    }

    fn operation(&self) -> &'static str {
        match self {
            ResourceKind::Queue => "ListQueues",
            ResourceKind::RoutingProfile => "ListRoutingProfiles",
            ResourceKind::AgentStatus => "ListAgentStatuses",
            ResourceKind::User => "ListUsers",
        }
    }

    pub fn metadata(&self, arn: Option<&str>, name: Option<&str>) -> Option<ConnectMetadata> {
        match arn {
            Some(arn) => Some(ConnectMetadata {
                arn: arn.to_string(),
                name: name.unwrap_or_default().to_string(),
                arn_type: self.arn_type(),
            }),
            None => {
                warn!("skipping {} without an arn", self.arn_type());
                None
            }
        }
    }
}

/// A named resource of the Connect instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectMetadata {
    pub arn: String,
    pub name: String,
    pub arn_type: &'static str,
}

impl SyncRecord for ConnectMetadata {
    fn key(&self) -> &str {
        &self.arn
    }
}

/// Trailing id of an ARN, e.g. the agent id of a user ARN.
pub fn resource_id(arn: &str) -> &str {
    arn.rsplit_once('/').map_or(arn, |(_, id)| id)
}

/// Lists one kind of instance resource.
pub struct MetadataSource {
    client: connect::Client,
    instance_id: String,
    kind: ResourceKind,
}

impl MetadataSource {
    pub fn new(client: connect::Client, instance_id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            client,
            instance_id: instance_id.into(),
            kind,
        }
    }
}

#[async_trait]
impl PageSource for MetadataSource {
    type Item = ConnectMetadata;

    fn operation(&self) -> &'static str {
        self.kind.operation()
    }

    async fn fetch_page(
        &self,
        _filter: &[String],
        next_token: Option<String>,
    ) -> Result<Page<ConnectMetadata>, SourceError> {
        let kind = self.kind;
        let op = kind.operation();
        let (items, next_token): (Vec<ConnectMetadata>, Option<String>) = match kind {
            ResourceKind::Queue => {
                let out = self
                    .client
                    .list_queues()
                    .instance_id(&self.instance_id)
                    .queue_types(QueueType::Standard)
                    .set_next_token(next_token)
                    .send()
                    .await
                    .map_err(|e| SourceError::from_sdk(op, e))?;
                let items = out
                    .queue_summary_list()
                    .iter()
                    .filter_map(|q| kind.metadata(q.arn(), q.name()))
                    .collect();
                (items, out.next_token().map(str::to_string))
            }
            ResourceKind::RoutingProfile => {
                let out = self
                    .client
                    .list_routing_profiles()
                    .instance_id(&self.instance_id)
                    .set_next_token(next_token)
                    .send()
                    .await
                    .map_err(|e| SourceError::from_sdk(op, e))?;
                let items = out
                    .routing_profile_summary_list()
                    .iter()
                    .filter_map(|rp| kind.metadata(rp.arn(), rp.name()))
                    .collect();
                (items, out.next_token().map(str::to_string))
            }
            ResourceKind::AgentStatus => {
                let out = self
                    .client
                    .list_agent_statuses()
                    .instance_id(&self.instance_id)
                    .agent_status_types(AgentStatusType::Routable)
                    .agent_status_types(AgentStatusType::Custom)
                    .agent_status_types(AgentStatusType::Offline)
                    .set_next_token(next_token)
                    .send()
                    .await
                    .map_err(|e| SourceError::from_sdk(op, e))?;
                let items = out
                    .agent_status_summary_list()
                    .iter()
                    .filter_map(|s| kind.metadata(s.arn(), s.name()))
                    .collect();
                (items, out.next_token().map(str::to_string))
            }
            ResourceKind::User => {
                let out = self
                    .client
                    .list_users()
                    .instance_id(&self.instance_id)
                    .set_next_token(next_token)
                    .send()
                    .await
                    .map_err(|e| SourceError::from_sdk(op, e))?;
                let items = out
                    .user_summary_list()
                    .iter()
                    .filter_map(|u| kind.metadata(u.arn(), u.username()))
                    .collect();
                (items, out.next_token().map(str::to_string))
            }
        };
        Ok(Page { items, next_token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arn_types_match_metadata_table() {
        let kinds = [
            ResourceKind::Queue,
            ResourceKind::RoutingProfile,
            ResourceKind::AgentStatus,
            ResourceKind::User,
        ];
        let types: Vec<&str> = kinds.iter().map(|k| k.arn_type()).collect();
        assert_eq!(types, vec!["queue", "routing profile", "agent status", "users"]);
    }

    #[test]
    fn entries_without_arn_are_dropped() {
        assert_eq!(ResourceKind::Queue.metadata(None, Some("Support")), None);
        let rp = ResourceKind::RoutingProfile
            .metadata(Some("arn:aws:connect:::instance/i/routing-profile/rp1"), None)
            .unwrap();
        assert_eq!(rp.name, "");
        assert_eq!(rp.arn_type, "routing profile");
    }

    #[test]
    fn agent_id_is_last_arn_segment() {
        assert_eq!(
            resource_id("arn:aws:connect:us-east-1:123456789012:instance/abc/agent/6a1f-42"),
            "6a1f-42"
        );
        assert_eq!(resource_id("no-slash"), "no-slash");
    }
}
