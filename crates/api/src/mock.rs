//! Scripted in-memory provider for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use cinder_core::{OffsetMap, TopicPartition};
use tokio_util::sync::CancellationToken;

use crate::{
    latency, ApiError, ApiResult, ClusterApi, ClusterDescription, ConfigEntry,
    ConsumerGroupDescription, ConsumerGroupListing, NewTopic, OffsetSpec, RegistryApi,
    SchemaMetadata, TopicConfig, TopicMetadata,
};

/// A canned response delivered after `delay`, or `Cancelled` if the caller's
/// token fires first.
#[derive(Debug, Clone)]
pub struct Scripted<T> {
    pub delay: Duration,
    pub result: ApiResult<T>,
}

impl<T> Scripted<T> {
    pub fn ok(value: T) -> Self {
        Self { delay: Duration::ZERO, result: Ok(value) }
    }

    pub fn err(error: ApiError) -> Self {
        Self { delay: Duration::ZERO, result: Err(error) }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Simple in-memory mock implementation for tests.
pub struct MockApi {
    pub name: String,
    pub cluster: Option<Scripted<ClusterDescription>>,
    pub broker_configs: HashMap<i32, Scripted<Vec<ConfigEntry>>>,
    pub topics: Option<Scripted<Vec<TopicMetadata>>>,
    pub topic: HashMap<String, Scripted<TopicMetadata>>,
    pub topic_config: HashMap<String, Scripted<Vec<ConfigEntry>>>,
    pub earliest: Option<Scripted<OffsetMap>>,
    pub latest: Option<Scripted<OffsetMap>>,
    pub groups: Option<Scripted<Vec<ConsumerGroupListing>>>,
    pub group: HashMap<String, Scripted<ConsumerGroupDescription>>,
    pub group_offsets: HashMap<String, Scripted<OffsetMap>>,
    pub subjects: Option<Scripted<Vec<String>>>,
    pub versions: HashMap<String, Scripted<Vec<i32>>>,
    pub schemas: HashMap<(String, i32), Scripted<SchemaMetadata>>,
    /// Keyed by topic name, for create, delete and config updates.
    pub create: HashMap<String, Scripted<()>>,
    pub delete: HashMap<String, Scripted<()>>,
    pub alter: HashMap<String, Scripted<()>>,
    calls: Mutex<Vec<&'static str>>,
    cancelled: AtomicUsize,
}

impl Default for MockApi {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            cluster: None,
            broker_configs: HashMap::new(),
            topics: None,
            topic: HashMap::new(),
            topic_config: HashMap::new(),
            earliest: None,
            latest: None,
            groups: None,
            group: HashMap::new(),
            group_offsets: HashMap::new(),
            subjects: None,
            versions: HashMap::new(),
            schemas: HashMap::new(),
            create: HashMap::new(),
            delete: HashMap::new(),
            alter: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            cancelled: AtomicUsize::new(0),
        }
    }
}

impl MockApi {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Operation names in call order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.calls().into_iter().filter(|c| *c == op).count()
    }

    /// Calls that observed their cancellation token before answering.
    pub fn cancelled_calls(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn record(&self, op: &'static str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(op);
        }
    }

    async fn play<T: Clone>(
        &self,
        op: &'static str,
        script: Option<&Scripted<T>>,
        cancel: CancellationToken,
    ) -> ApiResult<T> {
        self.record(op);
        let script = script.ok_or_else(|| ApiError::NotFound(format!("{op}: not scripted")))?;
        match latency(script.delay, &cancel).await {
            Ok(()) => script.result.clone(),
            Err(e) => {
                self.cancelled.fetch_add(1, Ordering::SeqCst);
                Err(e)
            }
        }
    }
}

#[async_trait::async_trait]
impl ClusterApi for MockApi {
    fn cluster_name(&self) -> &str {
        &self.name
    }

    async fn describe_cluster(&self, cancel: CancellationToken) -> ApiResult<ClusterDescription> {
        self.play("describe_cluster", self.cluster.as_ref(), cancel).await
    }

    async fn describe_broker_config(
        &self,
        broker_id: i32,
        cancel: CancellationToken,
    ) -> ApiResult<Vec<ConfigEntry>> {
        self.play("describe_broker_config", self.broker_configs.get(&broker_id), cancel).await
    }

    async fn list_topics(&self, cancel: CancellationToken) -> ApiResult<Vec<TopicMetadata>> {
        self.play("list_topics", self.topics.as_ref(), cancel).await
    }

    async fn describe_topic(&self, name: &str, cancel: CancellationToken) -> ApiResult<TopicMetadata> {
        self.play("describe_topic", self.topic.get(name), cancel).await
    }

    async fn describe_topic_config(
        &self,
        name: &str,
        cancel: CancellationToken,
    ) -> ApiResult<Vec<ConfigEntry>> {
        self.play("describe_topic_config", self.topic_config.get(name), cancel).await
    }

    async fn list_offsets(
        &self,
        partitions: Vec<TopicPartition>,
        spec: OffsetSpec,
        cancel: CancellationToken,
    ) -> ApiResult<OffsetMap> {
        let (op, script) = match spec {
            OffsetSpec::Earliest => ("list_offsets_earliest", self.earliest.as_ref()),
            OffsetSpec::Latest => ("list_offsets_latest", self.latest.as_ref()),
        };
        let all = self.play(op, script, cancel).await?;
        Ok(all.into_iter().filter(|(tp, _)| partitions.contains(tp)).collect())
    }

    async fn list_consumer_groups(
        &self,
        cancel: CancellationToken,
    ) -> ApiResult<Vec<ConsumerGroupListing>> {
        self.play("list_consumer_groups", self.groups.as_ref(), cancel).await
    }

    async fn describe_consumer_group(
        &self,
        group: &str,
        cancel: CancellationToken,
    ) -> ApiResult<ConsumerGroupDescription> {
        self.play("describe_consumer_group", self.group.get(group), cancel).await
    }

    async fn consumer_group_offsets(
        &self,
        group: &str,
        cancel: CancellationToken,
    ) -> ApiResult<OffsetMap> {
        self.play("consumer_group_offsets", self.group_offsets.get(group), cancel).await
    }

    async fn create_topic(&self, topic: NewTopic, cancel: CancellationToken) -> ApiResult<()> {
        self.play("create_topic", self.create.get(&topic.name), cancel).await
    }

    async fn delete_topic(&self, name: &str, cancel: CancellationToken) -> ApiResult<()> {
        self.play("delete_topic", self.delete.get(name), cancel).await
    }

    async fn update_topic_config(
        &self,
        name: &str,
        _config: TopicConfig,
        cancel: CancellationToken,
    ) -> ApiResult<()> {
        self.play("update_topic_config", self.alter.get(name), cancel).await
    }
}

#[async_trait::async_trait]
impl RegistryApi for MockApi {
    fn registry_name(&self) -> &str {
        &self.name
    }

    async fn subjects(&self, cancel: CancellationToken) -> ApiResult<Vec<String>> {
        self.play("subjects", self.subjects.as_ref(), cancel).await
    }

    async fn versions(&self, subject: &str, cancel: CancellationToken) -> ApiResult<Vec<i32>> {
        self.play("versions", self.versions.get(subject), cancel).await
    }

    async fn schema(
        &self,
        subject: &str,
        version: i32,
        cancel: CancellationToken,
    ) -> ApiResult<SchemaMetadata> {
        self.play("schema", self.schemas.get(&(subject.to_string(), version)), cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn scripted_delay_yields_to_cancellation() {
        let mut api = MockApi::new("local");
        api.topics = Some(Scripted::ok(Vec::new()).after(Duration::from_secs(30)));
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let call = tokio::spawn(async move { api.list_topics(child).await.map(|_| api.cancelled_calls()) });
        tokio::time::sleep(Duration::from_millis(5)).await;
        cancel.cancel();
        let res = call.await.expect("join");
        assert_eq!(res, Err(ApiError::Cancelled));
    }

    #[tokio::test]
    async fn unscripted_calls_are_not_found_and_recorded() {
        let api = MockApi::new("local");
        let err = api.describe_topic("orders", CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(api.calls(), vec!["describe_topic"]);
    }
}
