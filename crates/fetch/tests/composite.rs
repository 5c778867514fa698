use std::sync::Arc;
use std::time::Duration;

use cinder_api::{
    ApiError, ConfigEntry, ConsumerGroupDescription, MockApi, PartitionInfo, Scripted, TopicMetadata,
};
use cinder_core::{OffsetMap, TopicPartition};
use cinder_fetch::{FetchError, Fetcher};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn orders() -> TopicMetadata {
    TopicMetadata {
        name: "orders".into(),
        internal: false,
        partitions: (0..2)
            .map(|p| PartitionInfo { partition: p, leader: Some(1), replicas: vec![1].into(), isr: vec![1].into() })
            .collect(),
    }
}

fn offsets(pairs: &[(i32, i64)]) -> OffsetMap {
    pairs.iter().map(|(p, o)| (TopicPartition::new("orders", *p), *o)).collect()
}

fn fetcher(api: MockApi, timeout_ms: u64) -> (Fetcher, Arc<MockApi>) {
    let api = Arc::new(api);
    let f = Fetcher::new(api.clone(), Duration::from_millis(timeout_ms), CancellationToken::new());
    (f, api)
}

#[tokio::test(start_paused = true)]
async fn topic_describe_merges_all_parts() {
    let mut api = MockApi::new("local");
    api.topic.insert("orders".into(), Scripted::ok(orders()));
    api.topic_config.insert(
        "orders".into(),
        Scripted::ok(vec![ConfigEntry {
            name: "retention.ms".into(),
            value: Some("604800000".into()),
            source: "DEFAULT_CONFIG".into(),
            read_only: false,
            sensitive: false,
        }])
        .after(Duration::from_millis(30)),
    );
    api.earliest = Some(Scripted::ok(offsets(&[(0, 10), (1, 0)])).after(Duration::from_millis(20)));
    api.latest = Some(Scripted::ok(offsets(&[(0, 110), (1, 5)])).after(Duration::from_millis(10)));
    let (f, api) = fetcher(api, 1_000);

    let d = f.describe_topic("orders").await.expect("describe");
    assert_eq!(d.config.len(), 1);
    assert_eq!(d.earliest.len(), 2);
    assert_eq!(d.message_count(), 105);
    // Metadata stage precedes the three concurrent sub-requests.
    assert_eq!(api.calls()[0], "describe_topic");
    assert_eq!(api.calls().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn topic_describe_fails_fast_on_first_error() {
    let mut api = MockApi::new("local");
    api.topic.insert("orders".into(), Scripted::ok(orders()));
    api.topic_config
        .insert("orders".into(), Scripted::ok(Vec::new()).after(Duration::from_millis(200)));
    api.earliest = Some(
        Scripted::err(ApiError::Remote("leader not available".into())).after(Duration::from_millis(10)),
    );
    api.latest = Some(Scripted::ok(OffsetMap::new()).after(Duration::from_millis(200)));
    let (f, _api) = fetcher(api, 10_000);

    let t0 = Instant::now();
    let err = f.describe_topic("orders").await.unwrap_err();
    assert_eq!(err, FetchError::Remote(ApiError::Remote("leader not available".into())));
    let took = t0.elapsed();
    assert!(took >= Duration::from_millis(10) && took < Duration::from_millis(100), "took {took:?}");
}

#[tokio::test(start_paused = true)]
async fn composite_deadline_spans_both_stages() {
    let mut api = MockApi::new("local");
    api.group_offsets
        .insert("billing".into(), Scripted::ok(offsets(&[(0, 1)])).after(Duration::from_millis(40)));
    api.latest = Some(Scripted::ok(offsets(&[(0, 2)])).after(Duration::from_millis(40)));
    api.group.insert(
        "billing".into(),
        Scripted::ok(ConsumerGroupDescription {
            group_id: "billing".into(),
            state: "Stable".into(),
            protocol: "range".into(),
            coordinator: Some(1),
            members: Vec::new(),
        }),
    );
    // Each stage fits the budget alone; together they do not.
    let (f, _api) = fetcher(api, 60);

    let t0 = Instant::now();
    let err = f.describe_consumer_group("billing").await.unwrap_err();
    assert!(err.is_timeout(), "{err:?}");
    let took = t0.elapsed();
    assert!(took >= Duration::from_millis(60) && took < Duration::from_millis(80), "took {took:?}");
}

#[tokio::test(start_paused = true)]
async fn group_lag_skips_partitions_without_log_end() {
    let mut api = MockApi::new("local");
    api.group_offsets.insert("billing".into(), Scripted::ok(offsets(&[(0, 100), (1, 50)])));
    api.latest = Some(Scripted::ok(offsets(&[(0, 120)])));
    api.group.insert(
        "billing".into(),
        Scripted::ok(ConsumerGroupDescription {
            group_id: "billing".into(),
            state: "Stable".into(),
            protocol: "range".into(),
            coordinator: Some(1),
            members: Vec::new(),
        }),
    );
    let (f, api) = fetcher(api, 1_000);

    let g = f.describe_consumer_group("billing").await.expect("describe");
    assert_eq!(g.lag, offsets(&[(0, 20)]));
    assert_eq!(g.total_lag(), 20);
    assert_eq!(api.calls()[0], "consumer_group_offsets");
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_in_flight_provider_calls() {
    let mut api = MockApi::new("local");
    api.topics = Some(Scripted::ok(Vec::new()).after(Duration::from_secs(5)));
    let api = Arc::new(api);
    let root = CancellationToken::new();
    let f = Fetcher::new(api.clone(), Duration::from_secs(30), root.clone());

    let call = tokio::spawn(async move { f.list_topics().await });
    tokio::time::sleep(Duration::from_millis(5)).await;
    root.cancel();
    let res = call.await.expect("join");
    assert_eq!(res, Err(FetchError::Cancelled));
}

#[tokio::test]
async fn registry_calls_require_a_registry() {
    let (f, _api) = fetcher(MockApi::new("local"), 1_000);
    assert!(matches!(
        f.list_subjects().await,
        Err(FetchError::Remote(ApiError::Validation(_)))
    ));

    let mut registry = MockApi::new("sr");
    registry.versions.insert("orders-value".into(), Scripted::ok(vec![1, 3, 2]));
    let registry: Arc<dyn cinder_api::RegistryApi> = Arc::new(registry);
    let f = f.with_registry(Some(registry));
    assert_eq!(f.list_versions("orders-value").await.expect("versions"), vec![3, 2, 1]);
}
