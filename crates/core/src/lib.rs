//! Cinder core types: resource keys, topic partitions, offsets and lag.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub mod config;

/// Kafka offset as reported by the broker. Sentinels (-1 latest, -2 earliest)
/// are passed through untouched.
pub type Offset = i64;

/// Offsets keyed by topic partition. Ordered so renders are stable.
pub type OffsetMap = BTreeMap<TopicPartition, Offset>;

/// Deterministic identity of a renderable result, used both as cache key and
/// as history entry: parts are lower-cased and joined with `:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey(String);

impl ResourceKey {
    pub fn build<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = String::new();
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                out.push(':');
            }
            out.push_str(&part.as_ref().to_lowercase());
        }
        Self(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKey {
    fn from(v: &str) -> Self {
        Self::build([v])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self { topic: topic.into(), partition }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.topic, self.partition)
    }
}

/// Contextual key-binding set shown alongside a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Menu {
    Clusters,
    Nodes,
    Topics,
    ConsumerGroups,
    Subjects,
    Versions,
    /// Leaf description pages (topic, node, group, schema, cluster).
    Final,
    StatusHistory,
    OpenedPages,
}

impl Menu {
    pub fn label(&self) -> &'static str {
        match self {
            Menu::Clusters => "clusters",
            Menu::Nodes => "nodes",
            Menu::Topics => "topics",
            Menu::ConsumerGroups => "consumer groups",
            Menu::Subjects => "subjects",
            Menu::Versions => "versions",
            Menu::Final => "describe",
            Menu::StatusHistory => "status history",
            Menu::OpenedPages => "opened pages",
        }
    }
}

/// Lag per partition: `log_end - current` for every partition present in both
/// maps. Partitions without a log-end offset are omitted rather than reported
/// as zero; negative lag is not clamped.
pub fn compute_lag(current: &OffsetMap, log_end: &OffsetMap) -> OffsetMap {
    current
        .iter()
        .filter_map(|(tp, cur)| log_end.get(tp).map(|end| (tp.clone(), end.wrapping_sub(*cur))))
        .collect()
}

pub mod prelude {
    pub use super::{compute_lag, Menu, Offset, OffsetMap, ResourceKey, TopicPartition};
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tp(p: i32) -> TopicPartition {
        TopicPartition::new("orders", p)
    }

    #[test]
    fn resource_key_is_lowercased_and_colon_joined() {
        let k = ResourceKey::build(["Local", "Consumer groups", "Billing"]);
        assert_eq!(k.as_str(), "local:consumer groups:billing");
        assert_eq!(k, ResourceKey::build(["local", "consumer groups", "billing"]));
    }

    #[test]
    fn lag_omits_partitions_without_log_end() {
        let current: OffsetMap = [(tp(0), 100), (tp(1), 50)].into_iter().collect();
        let log_end: OffsetMap = [(tp(0), 120)].into_iter().collect();
        let lag = compute_lag(&current, &log_end);
        assert_eq!(lag.len(), 1);
        assert_eq!(lag.get(&tp(0)), Some(&20));
        assert!(lag.get(&tp(1)).is_none());
    }

    #[test]
    fn lag_passes_negative_values_through() {
        let current: OffsetMap = [(tp(0), 130)].into_iter().collect();
        let log_end: OffsetMap = [(tp(0), 120), (tp(7), 5)].into_iter().collect();
        let lag = compute_lag(&current, &log_end);
        assert_eq!(lag.get(&tp(0)), Some(&-10));
        // Extra log-end partitions never appear.
        assert!(lag.get(&tp(7)).is_none());
    }
}
