use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cinder_api::{FixtureApi, RegistryApi};
use cinder_core::TopicPartition;
use cinder_fetch::Fetcher;
use tokio_util::sync::CancellationToken;

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos/fixtures").join(format!("{name}.json"))
}

fn fetcher() -> Fetcher {
    let cluster = FixtureApi::from_file("Local", &demo("Local")).expect("cluster fixture");
    let registry: Arc<dyn RegistryApi> =
        Arc::new(FixtureApi::from_file("Registry", &demo("Registry")).expect("registry fixture"));
    Fetcher::new(Arc::new(cluster), Duration::from_secs(5), CancellationToken::new())
        .with_registry(Some(registry))
}

#[tokio::test(start_paused = true)]
async fn demo_group_lag() {
    let g = fetcher().describe_consumer_group("billing").await.expect("group");
    assert_eq!(g.lag.get(&TopicPartition::new("orders", 0)), Some(&20));
    assert_eq!(g.lag.get(&TopicPartition::new("orders", 1)), Some(&0));
    assert_eq!(g.total_lag(), 20);
}

#[tokio::test(start_paused = true)]
async fn demo_topic_and_schema() {
    let f = fetcher();
    let t = f.describe_topic("orders").await.expect("topic");
    assert_eq!(t.message_count(), 205);

    assert_eq!(f.list_versions("orders-value").await.expect("versions"), vec![2, 1]);
    let s = f.describe_schema("orders-value", 2).await.expect("schema");
    assert!(s.body.contains("\"amount\""));
}
