//! Shared plumbing for the Amazon Connect pull functions: Aurora connections
//! with IAM auth, paged reads from Connect, insert/update reconciliation and
//! the dataload health queries.

pub mod config;
pub mod connect;
pub mod db;
pub mod error;
pub mod fetch;
pub mod health;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod pipeline;
pub mod reconcile;
pub mod retry;
pub mod store;
pub mod tables;

pub use config::{DbConfig, SourceConfig};
pub use connect::{connect_client, load_sdk_config, ConnectMetadata, MetadataSource, ResourceKind};
pub use db::ConnectionManager;
pub use error::{ConfigError, DbError, Retryable, SourceError, SyncError};
pub use fetch::{Fetcher, Page, PageSource, MAX_FILTER_KEYS};
pub use pipeline::{FieldMapper, RowBuilder, SyncPipeline, SyncReport, TableSpec, WriteMode};
pub use reconcile::{reconcile, Partition, SyncRecord};
pub use retry::RetryPolicy;
pub use store::{MySqlStore, Row, Store, Value};
