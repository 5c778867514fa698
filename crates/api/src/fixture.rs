//! Offline provider replaying a JSON cluster fixture.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use cinder_core::{OffsetMap, TopicPartition};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    latency, ApiError, ApiResult, ClusterApi, ClusterDescription, ConfigEntry,
    ConsumerGroupDescription, ConsumerGroupListing, NewTopic, OffsetSpec, PartitionInfo,
    RegistryApi, SchemaMetadata, TopicConfig, TopicMetadata,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionOffset {
    pub partition: i32,
    pub offset: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicFixture {
    pub metadata: TopicMetadata,
    #[serde(default)]
    pub config: Vec<ConfigEntry>,
    #[serde(default)]
    pub earliest: Vec<PartitionOffset>,
    #[serde(default)]
    pub latest: Vec<PartitionOffset>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommittedOffset {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupFixture {
    pub description: ConsumerGroupDescription,
    #[serde(default)]
    pub offsets: Vec<CommittedOffset>,
}

/// Snapshot of a cluster (and optionally its schema registry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    pub cluster: ClusterDescription,
    /// Broker id (as string) -> broker config.
    #[serde(default)]
    pub broker_configs: BTreeMap<String, Vec<ConfigEntry>>,
    #[serde(default)]
    pub topics: Vec<TopicFixture>,
    #[serde(default)]
    pub groups: Vec<GroupFixture>,
    /// Subject -> registered versions.
    #[serde(default)]
    pub subjects: BTreeMap<String, Vec<SchemaMetadata>>,
    /// Simulated per-call latency.
    #[serde(default)]
    pub latency_ms: u64,
}

/// Serves one fixture. Topic management mutates the in-memory copy only.
pub struct FixtureApi {
    name: String,
    latency: Duration,
    fixture: RwLock<Fixture>,
}

fn topic<'a>(fx: &'a Fixture, name: &str) -> ApiResult<&'a TopicFixture> {
    fx.topics
        .iter()
        .find(|t| t.metadata.name == name)
        .ok_or_else(|| ApiError::NotFound(format!("topic {name}")))
}

fn group<'a>(fx: &'a Fixture, group: &str) -> ApiResult<&'a GroupFixture> {
    fx.groups
        .iter()
        .find(|g| g.description.group_id == group)
        .ok_or_else(|| ApiError::NotFound(format!("consumer group {group}")))
}

impl FixtureApi {
    pub fn new(name: impl Into<String>, fixture: Fixture) -> Self {
        Self {
            name: name.into(),
            latency: Duration::from_millis(fixture.latency_ms),
            fixture: RwLock::new(fixture),
        }
    }

    pub fn from_file(name: impl Into<String>, path: &Path) -> Result<Self> {
        let raw = std::fs::read(path).with_context(|| format!("reading fixture {}", path.display()))?;
        let fixture: Fixture = serde_json::from_slice(&raw)
            .with_context(|| format!("parsing fixture {}", path.display()))?;
        debug!(
            path = %path.display(),
            topics = fixture.topics.len(),
            groups = fixture.groups.len(),
            "fixture loaded"
        );
        Ok(Self::new(name, fixture))
    }

    async fn wait(&self, cancel: &CancellationToken) -> ApiResult<()> {
        latency(self.latency, cancel).await
    }

    fn read(&self) -> RwLockReadGuard<'_, Fixture> {
        self.fixture.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Fixture> {
        self.fixture.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl ClusterApi for FixtureApi {
    fn cluster_name(&self) -> &str {
        &self.name
    }

    async fn describe_cluster(&self, cancel: CancellationToken) -> ApiResult<ClusterDescription> {
        self.wait(&cancel).await?;
        Ok(self.read().cluster.clone())
    }

    async fn describe_broker_config(
        &self,
        broker_id: i32,
        cancel: CancellationToken,
    ) -> ApiResult<Vec<ConfigEntry>> {
        self.wait(&cancel).await?;
        self.read()
            .broker_configs
            .get(&broker_id.to_string())
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("no results found for broker {broker_id}")))
    }

    async fn list_topics(&self, cancel: CancellationToken) -> ApiResult<Vec<TopicMetadata>> {
        self.wait(&cancel).await?;
        Ok(self.read().topics.iter().map(|t| t.metadata.clone()).collect())
    }

    async fn describe_topic(&self, name: &str, cancel: CancellationToken) -> ApiResult<TopicMetadata> {
        self.wait(&cancel).await?;
        let fx = self.read();
        let metadata = topic(&fx, name)?.metadata.clone();
        Ok(metadata)
    }

    async fn describe_topic_config(
        &self,
        name: &str,
        cancel: CancellationToken,
    ) -> ApiResult<Vec<ConfigEntry>> {
        self.wait(&cancel).await?;
        let fx = self.read();
        let config = topic(&fx, name)?.config.clone();
        Ok(config)
    }

    async fn list_offsets(
        &self,
        partitions: Vec<TopicPartition>,
        spec: OffsetSpec,
        cancel: CancellationToken,
    ) -> ApiResult<OffsetMap> {
        self.wait(&cancel).await?;
        let fx = self.read();
        let mut out = OffsetMap::new();
        for tp in partitions {
            let Ok(t) = topic(&fx, &tp.topic) else { continue };
            let offsets = match spec {
                OffsetSpec::Earliest => &t.earliest,
                OffsetSpec::Latest => &t.latest,
            };
            if let Some(po) = offsets.iter().find(|po| po.partition == tp.partition) {
                out.insert(tp, po.offset);
            }
        }
        Ok(out)
    }

    async fn list_consumer_groups(
        &self,
        cancel: CancellationToken,
    ) -> ApiResult<Vec<ConsumerGroupListing>> {
        self.wait(&cancel).await?;
        Ok(self
            .read()
            .groups
            .iter()
            .map(|g| ConsumerGroupListing {
                group_id: g.description.group_id.clone(),
                state: g.description.state.clone(),
                simple: g.description.protocol.is_empty(),
            })
            .collect())
    }

    async fn describe_consumer_group(
        &self,
        id: &str,
        cancel: CancellationToken,
    ) -> ApiResult<ConsumerGroupDescription> {
        self.wait(&cancel).await?;
        let fx = self.read();
        let description = group(&fx, id)?.description.clone();
        Ok(description)
    }

    async fn consumer_group_offsets(
        &self,
        id: &str,
        cancel: CancellationToken,
    ) -> ApiResult<OffsetMap> {
        self.wait(&cancel).await?;
        let fx = self.read();
        let offsets = group(&fx, id)?
            .offsets
            .iter()
            .map(|o| (TopicPartition::new(o.topic.clone(), o.partition), o.offset))
            .collect();
        Ok(offsets)
    }

    async fn create_topic(&self, new: NewTopic, cancel: CancellationToken) -> ApiResult<()> {
        self.wait(&cancel).await?;
        let mut fx = self.write();
        if topic(&fx, &new.name).is_ok() {
            return Err(ApiError::Validation(format!("topic '{}' already exists", new.name)));
        }
        let brokers: Vec<i32> = fx.cluster.nodes.iter().map(|n| n.id).collect();
        let rf = usize::try_from(new.replication_factor).unwrap_or(0);
        if rf > brokers.len() {
            return Err(ApiError::Validation(format!(
                "replication factor {rf} larger than available brokers {}",
                brokers.len()
            )));
        }
        let partitions = (0..new.partitions)
            .map(|p| {
                let replicas: SmallVec<[i32; 4]> =
                    (0..rf).map(|r| brokers[(p as usize + r) % brokers.len()]).collect();
                PartitionInfo { partition: p, leader: replicas.first().copied(), isr: replicas.clone(), replicas }
            })
            .collect();
        let zeros: Vec<PartitionOffset> =
            (0..new.partitions).map(|partition| PartitionOffset { partition, offset: 0 }).collect();
        fx.topics.push(TopicFixture {
            metadata: TopicMetadata { name: new.name.clone(), internal: false, partitions },
            config: new.config.into_iter().map(|(name, value)| dynamic_entry(name, value)).collect(),
            earliest: zeros.clone(),
            latest: zeros,
        });
        debug!(topic = %new.name, "fixture topic created");
        Ok(())
    }

    async fn delete_topic(&self, name: &str, cancel: CancellationToken) -> ApiResult<()> {
        self.wait(&cancel).await?;
        let mut fx = self.write();
        let before = fx.topics.len();
        fx.topics.retain(|t| t.metadata.name != name);
        if fx.topics.len() == before {
            return Err(ApiError::NotFound(format!("topic {name}")));
        }
        Ok(())
    }

    async fn update_topic_config(
        &self,
        name: &str,
        config: TopicConfig,
        cancel: CancellationToken,
    ) -> ApiResult<()> {
        self.wait(&cancel).await?;
        let mut fx = self.write();
        let t = fx
            .topics
            .iter_mut()
            .find(|t| t.metadata.name == name)
            .ok_or_else(|| ApiError::NotFound(format!("topic {name}")))?;
        for (key, value) in config {
            match t.config.iter_mut().find(|e| e.name == key) {
                Some(entry) if entry.read_only => {
                    return Err(ApiError::Validation(format!("config {key} is read-only")));
                }
                Some(entry) => *entry = dynamic_entry(key, value),
                None => t.config.push(dynamic_entry(key, value)),
            }
        }
        Ok(())
    }
}

fn dynamic_entry(name: String, value: String) -> ConfigEntry {
    ConfigEntry {
        name,
        value: Some(value),
        source: "DYNAMIC_TOPIC_CONFIG".into(),
        read_only: false,
        sensitive: false,
    }
}

#[async_trait::async_trait]
impl RegistryApi for FixtureApi {
    fn registry_name(&self) -> &str {
        &self.name
    }

    async fn subjects(&self, cancel: CancellationToken) -> ApiResult<Vec<String>> {
        self.wait(&cancel).await?;
        Ok(self.read().subjects.keys().cloned().collect())
    }

    async fn versions(&self, subject: &str, cancel: CancellationToken) -> ApiResult<Vec<i32>> {
        self.wait(&cancel).await?;
        let fx = self.read();
        let schemas = fx
            .subjects
            .get(subject)
            .ok_or_else(|| ApiError::NotFound(format!("subject {subject}")))?;
        let mut versions: Vec<i32> = schemas.iter().map(|s| s.version).collect();
        versions.sort_unstable_by(|a, b| b.cmp(a));
        Ok(versions)
    }

    async fn schema(
        &self,
        subject: &str,
        version: i32,
        cancel: CancellationToken,
    ) -> ApiResult<SchemaMetadata> {
        self.wait(&cancel).await?;
        self.read()
            .subjects
            .get(subject)
            .and_then(|v| v.iter().find(|s| s.version == version))
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("schema {subject} v{version}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "cluster": { "cluster_id": "abc", "controller": 1,
                     "nodes": [{ "id": 1, "host": "kafka-1", "port": 9092 }] },
        "topics": [{
            "metadata": { "name": "orders", "partitions": [
                { "partition": 0, "leader": 1, "replicas": [1], "isr": [1] },
                { "partition": 1, "leader": 1, "replicas": [1], "isr": [1] } ] },
            "earliest": [{ "partition": 0, "offset": 0 }],
            "latest": [{ "partition": 0, "offset": 42 }, { "partition": 1, "offset": 7 }]
        }],
        "subjects": { "orders-value": [
            { "subject": "orders-value", "version": 1, "id": 10, "schema": "{}" },
            { "subject": "orders-value", "version": 2, "id": 11, "schema": "{}" } ] }
    }"#;

    fn api() -> FixtureApi {
        FixtureApi::new("local", serde_json::from_str(FIXTURE).expect("fixture"))
    }

    #[tokio::test]
    async fn offsets_are_filtered_to_requested_partitions() {
        let api = api();
        let tps = vec![TopicPartition::new("orders", 1), TopicPartition::new("missing", 0)];
        let end = api.list_offsets(tps, OffsetSpec::Latest, CancellationToken::new()).await.expect("ok");
        assert_eq!(end.len(), 1);
        assert_eq!(end.get(&TopicPartition::new("orders", 1)), Some(&7));
    }

    #[tokio::test]
    async fn versions_are_newest_first() {
        let api = api();
        let v = api.versions("orders-value", CancellationToken::new()).await.expect("ok");
        assert_eq!(v, vec![2, 1]);
        assert!(matches!(
            api.schema("orders-value", 9, CancellationToken::new()).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn topic_management_edits_the_snapshot() {
        let api = api();
        let new = NewTopic {
            name: "refunds".into(),
            partitions: 3,
            replication_factor: 1,
            config: [("retention.ms".to_string(), "1000".to_string())].into_iter().collect(),
        };
        api.create_topic(new.clone(), CancellationToken::new()).await.expect("create");
        assert!(matches!(
            api.create_topic(new, CancellationToken::new()).await,
            Err(ApiError::Validation(_))
        ));
        let meta = api.describe_topic("refunds", CancellationToken::new()).await.expect("describe");
        assert_eq!(meta.partitions.len(), 3);
        assert_eq!(meta.partitions[2].leader, Some(1));

        let update: TopicConfig = [("retention.ms".to_string(), "5000".to_string())].into_iter().collect();
        api.update_topic_config("refunds", update, CancellationToken::new()).await.expect("update");
        let config = api.describe_topic_config("refunds", CancellationToken::new()).await.expect("config");
        assert_eq!(config.len(), 1);
        assert_eq!(config[0].value.as_deref(), Some("5000"));

        api.delete_topic("refunds", CancellationToken::new()).await.expect("delete");
        assert!(matches!(
            api.delete_topic("refunds", CancellationToken::new()).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn replication_beyond_brokers_is_rejected() {
        let api = api();
        let new = NewTopic { name: "wide".into(), partitions: 1, replication_factor: 3, config: TopicConfig::new() };
        assert!(matches!(api.create_topic(new, CancellationToken::new()).await, Err(ApiError::Validation(_))));
    }
}
