//! Topic management. Each mutation is a single provider call under the same
//! deadline and cancellation rules as the describes.

use cinder_api::{ApiError, NewTopic, TopicConfig};

use crate::{observed, Fetcher, FetchError};

fn invalid(msg: String) -> FetchError {
    FetchError::Remote(ApiError::Validation(msg))
}

impl Fetcher {
    pub async fn create_topic(&self, topic: NewTopic) -> Result<(), FetchError> {
        if topic.name.trim().is_empty() {
            return Err(invalid("topic name is empty".into()));
        }
        if topic.partitions < 1 {
            return Err(invalid(format!("invalid number of partitions: {}", topic.partitions)));
        }
        if topic.replication_factor < 1 {
            return Err(invalid(format!("invalid replication factor: {}", topic.replication_factor)));
        }
        observed("create_topic", async {
            let api = self.cluster.clone();
            self.one("create_topic", self.deadline(), move |c| async move { api.create_topic(topic, c).await })
                .await
        })
        .await
    }

    pub async fn delete_topic(&self, name: &str) -> Result<(), FetchError> {
        observed("delete_topic", async {
            let api = self.cluster.clone();
            let name = name.to_string();
            self.one("delete_topic", self.deadline(), move |c| async move { api.delete_topic(&name, c).await })
                .await
        })
        .await
    }

    pub async fn update_topic_config(&self, name: &str, config: TopicConfig) -> Result<(), FetchError> {
        if config.is_empty() {
            return Err(invalid("no config entries to update".into()));
        }
        observed("update_topic_config", async {
            let api = self.cluster.clone();
            let name = name.to_string();
            self.one("update_topic_config", self.deadline(), move |c| async move {
                api.update_topic_config(&name, config, c).await
            })
            .await
        })
        .await
    }
}
