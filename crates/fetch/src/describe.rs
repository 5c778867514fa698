use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cinder_api::{
    ApiError, ApiResult, BrokerNode, ClusterApi, ClusterDescription, ConfigEntry,
    ConsumerGroupDescription, ConsumerGroupListing, OffsetSpec, RegistryApi, SchemaMetadata,
    TopicMetadata,
};
use cinder_core::{compute_lag, OffsetMap};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{observed, FanOut, FetchError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterOverview {
    pub name: String,
    pub description: ClusterDescription,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub node_id: i32,
    pub config: Vec<ConfigEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicDescription {
    pub metadata: TopicMetadata,
    pub config: Vec<ConfigEntry>,
    pub earliest: OffsetMap,
    pub latest: OffsetMap,
}

impl TopicDescription {
    /// Messages currently retained: sum of `latest - earliest` over partitions
    /// with both offsets.
    pub fn message_count(&self) -> i64 {
        compute_lag(&self.earliest, &self.latest).values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupLag {
    pub description: ConsumerGroupDescription,
    pub current: OffsetMap,
    pub log_end: OffsetMap,
    pub lag: OffsetMap,
}

impl GroupLag {
    pub fn total_lag(&self) -> i64 {
        self.lag.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDetail {
    pub metadata: SchemaMetadata,
    /// Pretty-printed when the schema body is JSON, verbatim otherwise.
    pub body: String,
}

enum TopicPart {
    Config(Vec<ConfigEntry>),
    Earliest(OffsetMap),
    Latest(OffsetMap),
}

enum GroupPart {
    LogEnd(OffsetMap),
    Description(ConsumerGroupDescription),
}

/// Describe operations against one cluster (and optionally one registry).
///
/// Every call gets its own deadline of `timeout`; composite calls spend that
/// budget across all of their stages.
#[derive(Clone)]
pub struct Fetcher {
    pub(crate) cluster: Arc<dyn ClusterApi>,
    registry: Option<Arc<dyn RegistryApi>>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl Fetcher {
    pub fn new(cluster: Arc<dyn ClusterApi>, timeout: Duration, cancel: CancellationToken) -> Self {
        Self { cluster, registry: None, timeout, cancel }
    }

    pub fn with_registry(mut self, registry: Option<Arc<dyn RegistryApi>>) -> Self {
        self.registry = registry;
        self
    }

    pub fn cluster_name(&self) -> &str {
        self.cluster.cluster_name()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn deadline(&self) -> Instant {
        Instant::now() + self.timeout
    }

    fn registry(&self) -> Result<Arc<dyn RegistryApi>, FetchError> {
        self.registry
            .clone()
            .ok_or_else(|| FetchError::Remote(ApiError::Validation("no schema registry selected".into())))
    }

    /// N = 1 fan-out: still raced against the deadline and the token.
    pub(crate) async fn one<T, F, Fut>(&self, label: &'static str, deadline: Instant, sub: F) -> Result<T, FetchError>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        let mut fan = FanOut::new(label, deadline, self.timeout, &self.cancel);
        fan.spawn(sub);
        fan.collect()
            .await?
            .pop()
            .ok_or_else(|| FetchError::Remote(ApiError::Remote(format!("{label}: empty result"))))
    }

    pub async fn describe_cluster(&self) -> Result<ClusterOverview, FetchError> {
        observed("describe_cluster", async {
            let api = self.cluster.clone();
            let description =
                self.one("describe_cluster", self.deadline(), move |c| async move { api.describe_cluster(c).await }).await?;
            Ok(ClusterOverview { name: self.cluster.cluster_name().to_string(), description })
        })
        .await
    }

    /// Broker nodes, ordered by id.
    pub async fn list_nodes(&self) -> Result<Vec<BrokerNode>, FetchError> {
        observed("list_nodes", async {
            let api = self.cluster.clone();
            let description =
                self.one("list_nodes", self.deadline(), move |c| async move { api.describe_cluster(c).await }).await?;
            let mut nodes = description.nodes;
            nodes.sort_by_key(|n| n.id);
            Ok(nodes)
        })
        .await
    }

    pub async fn describe_node(&self, node_id: i32) -> Result<NodeConfig, FetchError> {
        observed("describe_node", async {
            let api = self.cluster.clone();
            let config = self
                .one("describe_node", self.deadline(), move |c| async move {
                    api.describe_broker_config(node_id, c).await
                })
                .await?;
            Ok(NodeConfig { node_id, config })
        })
        .await
    }

    /// Topic names sorted; internal topics included.
    pub async fn list_topics(&self) -> Result<Vec<TopicMetadata>, FetchError> {
        observed("list_topics", async {
            let api = self.cluster.clone();
            let mut topics =
                self.one("list_topics", self.deadline(), move |c| async move { api.list_topics(c).await }).await?;
            topics.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(topics)
        })
        .await
    }

    /// Metadata first (partitions are needed for the offset queries), then
    /// config plus earliest and latest offsets concurrently.
    pub async fn describe_topic(&self, name: &str) -> Result<TopicDescription, FetchError> {
        observed("describe_topic", async {
            let deadline = self.deadline();
            let api = self.cluster.clone();
            let topic = name.to_string();
            let metadata = self
                .one("describe_topic", deadline, move |c| async move { api.describe_topic(&topic, c).await })
                .await?;

            let partitions = metadata.topic_partitions();
            let mut fan = FanOut::new("describe_topic", deadline, self.timeout, &self.cancel);
            {
                let api = self.cluster.clone();
                let topic = name.to_string();
                fan.spawn(move |c| async move { api.describe_topic_config(&topic, c).await.map(TopicPart::Config) });
            }
            {
                let api = self.cluster.clone();
                let tps = partitions.clone();
                fan.spawn(move |c| async move {
                    api.list_offsets(tps, OffsetSpec::Earliest, c).await.map(TopicPart::Earliest)
                });
            }
            {
                let api = self.cluster.clone();
                fan.spawn(move |c| async move {
                    api.list_offsets(partitions, OffsetSpec::Latest, c).await.map(TopicPart::Latest)
                });
            }

            let mut out = TopicDescription {
                metadata,
                config: Vec::new(),
                earliest: OffsetMap::new(),
                latest: OffsetMap::new(),
            };
            for part in fan.collect().await? {
                match part {
                    TopicPart::Config(c) => out.config = c,
                    TopicPart::Earliest(o) => out.earliest = o,
                    TopicPart::Latest(o) => out.latest = o,
                }
            }
            Ok(out)
        })
        .await
    }

    pub async fn list_consumer_groups(&self) -> Result<Vec<ConsumerGroupListing>, FetchError> {
        observed("list_consumer_groups", async {
            let api = self.cluster.clone();
            let mut groups = self
                .one("list_consumer_groups", self.deadline(), move |c| async move {
                    api.list_consumer_groups(c).await
                })
                .await?;
            groups.sort_by(|a, b| a.group_id.cmp(&b.group_id));
            Ok(groups)
        })
        .await
    }

    /// Committed offsets first, then the log-end offsets of exactly those
    /// partitions alongside the group description; lag is computed once both
    /// offset maps are in.
    pub async fn describe_consumer_group(&self, group: &str) -> Result<GroupLag, FetchError> {
        observed("describe_consumer_group", async {
            let deadline = self.deadline();
            let api = self.cluster.clone();
            let id = group.to_string();
            let current = self
                .one("describe_consumer_group", deadline, move |c| async move {
                    api.consumer_group_offsets(&id, c).await
                })
                .await?;

            let mut fan = FanOut::new("describe_consumer_group", deadline, self.timeout, &self.cancel);
            {
                let api = self.cluster.clone();
                let tps: Vec<_> = current.keys().cloned().collect();
                fan.spawn(move |c| async move {
                    api.list_offsets(tps, OffsetSpec::Latest, c).await.map(GroupPart::LogEnd)
                });
            }
            {
                let api = self.cluster.clone();
                let id = group.to_string();
                fan.spawn(move |c| async move {
                    api.describe_consumer_group(&id, c).await.map(GroupPart::Description)
                });
            }

            let mut log_end = OffsetMap::new();
            let mut description = None;
            for part in fan.collect().await? {
                match part {
                    GroupPart::LogEnd(o) => log_end = o,
                    GroupPart::Description(d) => description = Some(d),
                }
            }
            let description = description.ok_or_else(|| {
                FetchError::Remote(ApiError::Remote(format!("consumer group {group}: no description")))
            })?;
            let lag = compute_lag(&current, &log_end);
            Ok(GroupLag { description, current, log_end, lag })
        })
        .await
    }

    pub async fn list_subjects(&self) -> Result<Vec<String>, FetchError> {
        observed("list_subjects", async {
            let api = self.registry()?;
            let mut subjects =
                self.one("list_subjects", self.deadline(), move |c| async move { api.subjects(c).await }).await?;
            subjects.sort();
            Ok(subjects)
        })
        .await
    }

    /// Newest first.
    pub async fn list_versions(&self, subject: &str) -> Result<Vec<i32>, FetchError> {
        observed("list_versions", async {
            let api = self.registry()?;
            let subject = subject.to_string();
            let mut versions = self
                .one("list_versions", self.deadline(), move |c| async move { api.versions(&subject, c).await })
                .await?;
            versions.sort_unstable_by(|a, b| b.cmp(a));
            Ok(versions)
        })
        .await
    }

    pub async fn describe_schema(&self, subject: &str, version: i32) -> Result<SchemaDetail, FetchError> {
        observed("describe_schema", async {
            let api = self.registry()?;
            let subject = subject.to_string();
            let metadata = self
                .one("describe_schema", self.deadline(), move |c| async move {
                    api.schema(&subject, version, c).await
                })
                .await?;
            let body = match serde_json::from_str::<serde_json::Value>(&metadata.schema) {
                Ok(v) => serde_json::to_string_pretty(&v).unwrap_or_else(|_| metadata.schema.clone()),
                Err(_) => metadata.schema.clone(),
            };
            Ok(SchemaDetail { metadata, body })
        })
        .await
    }
}
