//! Cinder provider API façade.
//!
//! Defines the narrow request/response contract the fetch engine depends on.
//! Implementations talk to a Kafka cluster and a Schema Registry; the engine
//! never sees the wire protocol. Every call carries a cancellation token so an
//! abandoned composite fetch stops its sub-requests instead of leaking them.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use cinder_core::{OffsetMap, TopicPartition};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tokio_util::sync::CancellationToken;

mod fixture;
mod mock;

pub use fixture::{Fixture, FixtureApi};
pub use mock::{MockApi, Scripted};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrokerNode {
    pub id: i32,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub rack: Option<String>,
}

impl BrokerNode {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterDescription {
    pub cluster_id: String,
    #[serde(default)]
    pub controller: Option<i32>,
    pub nodes: Vec<BrokerNode>,
    #[serde(default)]
    pub authorized_operations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigEntry {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub sensitive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartitionInfo {
    pub partition: i32,
    #[serde(default)]
    pub leader: Option<i32>,
    #[serde(default)]
    pub replicas: SmallVec<[i32; 4]>,
    #[serde(default)]
    pub isr: SmallVec<[i32; 4]>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicMetadata {
    pub name: String,
    #[serde(default)]
    pub internal: bool,
    pub partitions: Vec<PartitionInfo>,
}

impl TopicMetadata {
    pub fn replication_factor(&self) -> usize {
        self.partitions.first().map(|p| p.replicas.len()).unwrap_or(0)
    }

    pub fn topic_partitions(&self) -> Vec<TopicPartition> {
        self.partitions
            .iter()
            .map(|p| TopicPartition::new(self.name.clone(), p.partition))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsumerGroupListing {
    pub group_id: String,
    pub state: String,
    #[serde(default)]
    pub simple: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupMember {
    pub member_id: String,
    pub client_id: String,
    pub host: String,
    #[serde(default)]
    pub assignment: Vec<TopicPartition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsumerGroupDescription {
    pub group_id: String,
    pub state: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub coordinator: Option<i32>,
    #[serde(default)]
    pub members: Vec<GroupMember>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaMetadata {
    pub subject: String,
    pub version: i32,
    pub id: i32,
    #[serde(default = "default_schema_type")]
    pub schema_type: String,
    pub schema: String,
}

fn default_schema_type() -> String {
    "AVRO".to_string()
}

/// Topic-level config overrides, `name -> value`.
pub type TopicConfig = BTreeMap<String, String>;

/// Request to create a topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NewTopic {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i16,
    #[serde(default)]
    pub config: TopicConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OffsetSpec {
    Earliest,
    Latest,
}

/// Provider errors. Serializable so a remote provider can forward them as-is.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum ApiError {
    #[error("remote: {0}")]
    Remote(String),
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("cancelled")]
    Cancelled,
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Kafka admin surface used by the fetch engine.
#[async_trait::async_trait]
pub trait ClusterApi: Send + Sync {
    /// Name of the configured cluster this client talks to.
    fn cluster_name(&self) -> &str;

    async fn describe_cluster(&self, cancel: CancellationToken) -> ApiResult<ClusterDescription>;

    /// Broker-level configuration for a single node.
    async fn describe_broker_config(
        &self,
        broker_id: i32,
        cancel: CancellationToken,
    ) -> ApiResult<Vec<ConfigEntry>>;

    async fn list_topics(&self, cancel: CancellationToken) -> ApiResult<Vec<TopicMetadata>>;

    async fn describe_topic(&self, name: &str, cancel: CancellationToken) -> ApiResult<TopicMetadata>;

    async fn describe_topic_config(
        &self,
        name: &str,
        cancel: CancellationToken,
    ) -> ApiResult<Vec<ConfigEntry>>;

    /// Earliest or latest (read-committed) offsets for the given partitions.
    async fn list_offsets(
        &self,
        partitions: Vec<TopicPartition>,
        spec: OffsetSpec,
        cancel: CancellationToken,
    ) -> ApiResult<OffsetMap>;

    async fn list_consumer_groups(
        &self,
        cancel: CancellationToken,
    ) -> ApiResult<Vec<ConsumerGroupListing>>;

    async fn describe_consumer_group(
        &self,
        group: &str,
        cancel: CancellationToken,
    ) -> ApiResult<ConsumerGroupDescription>;

    /// Committed offsets of a consumer group.
    async fn consumer_group_offsets(
        &self,
        group: &str,
        cancel: CancellationToken,
    ) -> ApiResult<OffsetMap>;

    async fn create_topic(&self, topic: NewTopic, cancel: CancellationToken) -> ApiResult<()>;

    async fn delete_topic(&self, name: &str, cancel: CancellationToken) -> ApiResult<()>;

    /// Set the given entries; entries not named are left as they are.
    async fn update_topic_config(
        &self,
        name: &str,
        config: TopicConfig,
        cancel: CancellationToken,
    ) -> ApiResult<()>;
}

/// Schema Registry surface.
#[async_trait::async_trait]
pub trait RegistryApi: Send + Sync {
    fn registry_name(&self) -> &str;

    async fn subjects(&self, cancel: CancellationToken) -> ApiResult<Vec<String>>;

    /// Versions of a subject, newest first.
    async fn versions(&self, subject: &str, cancel: CancellationToken) -> ApiResult<Vec<i32>>;

    async fn schema(
        &self,
        subject: &str,
        version: i32,
        cancel: CancellationToken,
    ) -> ApiResult<SchemaMetadata>;
}

/// Sleep for `delay` unless cancelled first.
pub(crate) async fn latency(delay: std::time::Duration, cancel: &CancellationToken) -> ApiResult<()> {
    if delay.is_zero() {
        return if cancel.is_cancelled() { Err(ApiError::Cancelled) } else { Ok(()) };
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(ApiError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
