#![forbid(unsafe_code)]

//! Fetch results to pages. Pure; no I/O.

use std::fmt::Write as _;

use cinder_api::{BrokerNode, ConfigEntry, ConsumerGroupListing, TopicMetadata};
use cinder_core::config::Config;
use cinder_core::TopicPartition;
use cinder_fetch::{ClusterOverview, GroupLag, NodeConfig, SchemaDetail, TopicDescription};
use rustc_hash::FxHashMap;

use crate::model::Page;

/// Left-aligned columns separated by one space, like a tab writer.
fn columns(out: &mut String, rows: &[Vec<String>]) {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0usize; width];
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }
    for row in rows {
        let mut line = String::new();
        for (i, cell) in row.iter().enumerate() {
            if i + 1 == row.len() {
                line.push_str(cell);
            } else {
                let _ = write!(line, "{cell:<w$} ", w = widths[i]);
            }
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
}

fn config_table(out: &mut String, entries: &[ConfigEntry]) {
    let mut sorted: Vec<&ConfigEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    let mut rows = vec![["Name", "Value", "Source", "Read-only", "Sensitive"].map(String::from).to_vec()];
    for e in sorted {
        let value = if e.sensitive { "******".to_string() } else { e.value.clone().unwrap_or_default() };
        rows.push(vec![e.name.clone(), value, e.source.clone(), e.read_only.to_string(), e.sensitive.to_string()]);
    }
    columns(out, &rows);
}

pub fn clusters(config: &Config, selected: Option<&str>) -> Page {
    let rows = config
        .clusters
        .iter()
        .map(|c| {
            let mark = if Some(c.name.as_str()) == selected { "*" } else { "" };
            vec![c.name.clone(), c.bootstrap_servers().to_string(), mark.to_string()]
        })
        .collect();
    Page::table("Clusters", &["Name", "Bootstrap servers", "Selected"], rows)
}

pub fn cluster(overview: &ClusterOverview) -> Page {
    let d = &overview.description;
    let mut out = String::new();
    let _ = writeln!(out, "Name: {}", overview.name);
    let _ = writeln!(out, "ClusterId: {}", d.cluster_id);
    let controller = d.controller.map(|c| c.to_string()).unwrap_or_else(|| "-".into());
    let _ = writeln!(out, "Controller: {controller}");
    let _ = writeln!(out, "Allowed operations: {}", d.authorized_operations.join(", "));
    out.push_str("Nodes:\n");
    for n in &d.nodes {
        let _ = writeln!(out, "  {} {}", n.id, n.address());
    }
    Page::text(format!("{} info", overview.name), out)
}

pub fn nodes(cluster: &str, nodes: &[BrokerNode]) -> Page {
    let rows = nodes
        .iter()
        .map(|n| {
            vec![n.id.to_string(), n.host.clone(), n.port.to_string(), n.rack.clone().unwrap_or_default()]
        })
        .collect();
    Page::table(format!("{cluster} nodes"), &["Id", "Host", "Port", "Rack"], rows)
}

pub fn node(cluster: &str, node: &NodeConfig) -> Page {
    let mut out = String::new();
    config_table(&mut out, &node.config);
    Page::text(format!("{cluster} node {}", node.node_id), out)
}

pub fn topics(cluster: &str, topics: &[TopicMetadata]) -> Page {
    let rows = topics
        .iter()
        .map(|t| {
            vec![t.name.clone(), t.partitions.len().to_string(), t.replication_factor().to_string()]
        })
        .collect();
    Page::table(format!("{cluster} topics"), &["Name", "Partitions", "Replication"], rows)
}

pub fn topic(d: &TopicDescription) -> Page {
    let mut out = String::new();
    let _ = writeln!(out, "Internal: {}", d.metadata.internal);
    let _ = writeln!(out, "Partitions count: {}", d.metadata.partitions.len());
    let _ = writeln!(out, "Messages: {}", d.message_count());
    out.push_str("Offsets:\n");
    for p in &d.metadata.partitions {
        let tp = TopicPartition::new(d.metadata.name.clone(), p.partition);
        let start = d.earliest.get(&tp).copied().unwrap_or_default();
        let end = d.latest.get(&tp).copied().unwrap_or_default();
        let _ = writeln!(out, "\t{}: [{start}, {end}] {}", p.partition, end - start);
    }
    out.push_str("Partitions details:\n");
    for p in &d.metadata.partitions {
        let leader = p.leader.map(|l| l.to_string()).unwrap_or_else(|| "-".into());
        let _ = writeln!(out, "\tPartition: {}", p.partition);
        let _ = writeln!(out, "\tLeader: {leader}");
        let _ = writeln!(out, "\tReplicas: {:?}", p.replicas.as_slice());
        let _ = writeln!(out, "\tISRs: {:?}", p.isr.as_slice());
    }
    out.push('\n');
    config_table(&mut out, &d.config);
    Page::text(format!("Topic: {}", d.metadata.name), out)
}

pub fn consumer_groups(cluster: &str, groups: &[ConsumerGroupListing]) -> Page {
    let rows = groups
        .iter()
        .map(|g| vec![g.group_id.clone(), g.state.clone(), g.simple.to_string()])
        .collect();
    Page::table(format!("{cluster} consumer groups"), &["Group", "State", "Simple"], rows)
}

pub fn consumer_group(g: &GroupLag) -> Page {
    let d = &g.description;
    let mut out = String::new();
    let _ = writeln!(out, "Group ID: {}", d.group_id);
    let _ = writeln!(out, "Partition Assignor: {}", d.protocol);
    let _ = writeln!(out, "State: {}", d.state);
    let _ = writeln!(out, "Total lag: {}", g.total_lag());
    out.push('\n');

    let mut owners: FxHashMap<&TopicPartition, (&str, &str)> = FxHashMap::default();
    for m in &d.members {
        for tp in &m.assignment {
            owners.insert(tp, (m.client_id.as_str(), m.host.as_str()));
        }
    }
    let mut rows = vec![["Topic", "Partition", "Current-Offset", "Log-End-Offset", "Lag", "Consumer-ID", "Host"]
        .map(String::from)
        .to_vec()];
    for (tp, current) in &g.current {
        let (consumer, host) = owners.get(tp).copied().unwrap_or(("-", "-"));
        let opt = |v: Option<&i64>| v.map(|o| o.to_string()).unwrap_or_else(|| "-".into());
        rows.push(vec![
            tp.topic.clone(),
            tp.partition.to_string(),
            current.to_string(),
            opt(g.log_end.get(tp)),
            opt(g.lag.get(tp)),
            consumer.to_string(),
            host.to_string(),
        ]);
    }
    columns(&mut out, &rows);
    Page::text(format!("Consumer group: {}", d.group_id), out)
}

pub fn subjects(registry: &str, subjects: &[String]) -> Page {
    let rows = subjects.iter().map(|s| vec![s.clone()]).collect();
    Page::table(format!("{registry} subjects"), &["Subject"], rows)
}

pub fn versions(subject: &str, versions: &[i32]) -> Page {
    let rows = versions.iter().map(|v| vec![v.to_string()]).collect();
    Page::table(format!("{subject} versions"), &["Version"], rows)
}

pub fn schema(s: &SchemaDetail) -> Page {
    let m = &s.metadata;
    let mut out = String::new();
    let _ = writeln!(out, "Subject: {}", m.subject);
    let _ = writeln!(out, "Version: {}", m.version);
    let _ = writeln!(out, "Id: {}", m.id);
    let _ = writeln!(out, "Type: {}", m.schema_type);
    out.push('\n');
    out.push_str(&s.body);
    Page::text(format!("{} v{}", m.subject, m.version), out)
}

pub fn status_history<'a>(lines: impl Iterator<Item = &'a str>) -> Page {
    let mut out = String::new();
    for l in lines {
        out.push_str(l);
        out.push('\n');
    }
    Page::text("Status History", out)
}

#[cfg(test)]
mod tests {
    use cinder_api::{ConsumerGroupDescription, GroupMember};
    use cinder_core::OffsetMap;

    use super::*;

    #[test]
    fn columns_pad_all_but_last() {
        let mut out = String::new();
        columns(&mut out, &[vec!["a".into(), "bb".into()], vec!["ccc".into(), "d".into()]]);
        assert_eq!(out, "a   bb\nccc d\n");
    }

    #[test]
    fn group_page_marks_missing_lag() {
        let tp0 = TopicPartition::new("orders", 0);
        let tp1 = TopicPartition::new("orders", 1);
        let current: OffsetMap = [(tp0.clone(), 100), (tp1.clone(), 50)].into_iter().collect();
        let log_end: OffsetMap = [(tp0.clone(), 120)].into_iter().collect();
        let g = GroupLag {
            description: ConsumerGroupDescription {
                group_id: "billing".into(),
                state: "Stable".into(),
                protocol: "range".into(),
                coordinator: Some(1),
                members: vec![GroupMember {
                    member_id: "m-1".into(),
                    client_id: "billing-1".into(),
                    host: "/10.0.0.7".into(),
                    assignment: vec![tp0.clone()],
                }],
            },
            lag: cinder_core::compute_lag(&current, &log_end),
            current,
            log_end,
        };
        let page = consumer_group(&g);
        let crate::model::PageBody::Text(text) = &page.body else { panic!("text page") };
        assert!(text.contains("Total lag: 20"));
        let p1 = text.lines().find(|l| l.starts_with("orders 1")).expect("row for p1");
        assert!(p1.contains(" - "), "{p1}");
        let p0 = text.lines().find(|l| l.starts_with("orders 0")).expect("row for p0");
        assert!(p0.contains("billing-1"));
    }
}
