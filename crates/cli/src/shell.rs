//! Line commands understood by the interactive shell.

use cinder_api::{NewTopic, TopicConfig};
use cinder_tui::EventKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Open(EventKind),
    Use(String),
    Select(usize),
    Enter,
    Back,
    Forward,
    Close,
    Refresh,
    Filter(String),
    Pages,
    History,
    Help,
    Quit,
}

pub const HELP: &str = "\
clusters | use <cluster> | info | nodes | node <id>
topics | topic <name> | groups | group <name>
subjects | versions <subject> | schema <subject> <version>
create-topic <name> <partitions> <replication> [key=value ...]
delete-topic <name> | set-config <topic> <key=value> ...
select <row #> | enter | back | forward | close | refresh
filter [query] | pages | history | help | quit";

/// `key=value` pairs; malformed pairs are an error.
fn config_pairs<'a>(words: impl Iterator<Item = &'a str>) -> Result<TopicConfig, String> {
    words
        .map(|w| match w.split_once('=') {
            Some((k, v)) if !k.trim().is_empty() && !v.trim().is_empty() => {
                Ok((k.trim().to_string(), v.trim().to_string()))
            }
            _ => Err(format!("expected key=value, got {w}")),
        })
        .collect()
}

pub fn parse(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (cmd, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    let arg = |what: &str| {
        if rest.is_empty() {
            Err(format!("{cmd}: missing {what}"))
        } else {
            Ok(rest.to_string())
        }
    };
    let cmd_lc = cmd.to_ascii_lowercase();
    let out = match cmd_lc.as_str() {
        "clusters" => Command::Open(EventKind::Clusters),
        "use" => Command::Use(arg("cluster name")?),
        "info" => Command::Open(EventKind::Cluster),
        "nodes" => Command::Open(EventKind::Nodes),
        "node" => {
            let id = arg("node id")?.parse().map_err(|_| format!("node: invalid id {rest}"))?;
            Command::Open(EventKind::Node { id })
        }
        "topics" => Command::Open(EventKind::Topics),
        "topic" => Command::Open(EventKind::Topic { name: arg("topic name")? }),
        "groups" => Command::Open(EventKind::ConsumerGroups),
        "group" => Command::Open(EventKind::ConsumerGroup { name: arg("group id")? }),
        "subjects" => Command::Open(EventKind::Subjects),
        "versions" => Command::Open(EventKind::Versions { subject: arg("subject")? }),
        "schema" => {
            let raw = arg("subject and version")?;
            let (subject, version) = raw
                .rsplit_once(char::is_whitespace)
                .ok_or_else(|| "schema: expected <subject> <version>".to_string())?;
            let version = version.parse().map_err(|_| format!("schema: invalid version {version}"))?;
            Command::Open(EventKind::Schema { subject: subject.trim().to_string(), version })
        }
        "select" => Command::Select(arg("row")?.parse().map_err(|_| format!("select: invalid row {rest}"))?),
        "create-topic" => {
            let mut words = rest.split_whitespace();
            let usage = || "create-topic: expected <name> <partitions> <replication> [key=value ...]".to_string();
            let name = words.next().ok_or_else(usage)?.to_string();
            let partitions = words.next().and_then(|w| w.parse().ok()).ok_or_else(usage)?;
            let replication_factor = words.next().and_then(|w| w.parse().ok()).ok_or_else(usage)?;
            let config = config_pairs(words)?;
            Command::Open(EventKind::CreateTopic {
                topic: NewTopic { name, partitions, replication_factor, config },
            })
        }
        "delete-topic" => Command::Open(EventKind::DeleteTopic { name: arg("topic name")? }),
        "set-config" => {
            let mut words = rest.split_whitespace();
            let name = words.next().ok_or_else(|| "set-config: missing topic name".to_string())?.to_string();
            let config = config_pairs(words)?;
            if config.is_empty() {
                return Err("set-config: expected at least one key=value".into());
            }
            Command::Open(EventKind::UpdateTopicConfig { name, config })
        }
        "enter" => Command::Enter,
        "back" | "b" => Command::Back,
        "forward" | "f" => Command::Forward,
        "close" => Command::Close,
        "refresh" | "r" => Command::Refresh,
        "filter" | "/" => Command::Filter(rest.to_string()),
        "pages" => Command::Pages,
        "history" => Command::History,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        "" => return Err(String::new()),
        other => return Err(format!("unknown command {other}; try help")),
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_resource_commands() {
        assert_eq!(parse("topic orders"), Ok(Command::Open(EventKind::Topic { name: "orders".into() })));
        assert_eq!(parse("  node 3 "), Ok(Command::Open(EventKind::Node { id: 3 })));
        assert_eq!(
            parse("schema orders-value 2"),
            Ok(Command::Open(EventKind::Schema { subject: "orders-value".into(), version: 2 }))
        );
        assert_eq!(parse("filter"), Ok(Command::Filter(String::new())));
        assert_eq!(parse("select 2"), Ok(Command::Select(2)));
    }

    #[test]
    fn parses_topic_management() {
        assert_eq!(
            parse("create-topic refunds 6 3 cleanup.policy=compact"),
            Ok(Command::Open(EventKind::CreateTopic {
                topic: NewTopic {
                    name: "refunds".into(),
                    partitions: 6,
                    replication_factor: 3,
                    config: [("cleanup.policy".to_string(), "compact".to_string())].into_iter().collect(),
                },
            }))
        );
        assert_eq!(parse("delete-topic refunds"), Ok(Command::Open(EventKind::DeleteTopic { name: "refunds".into() })));
        assert!(parse("create-topic refunds six 3").is_err());
        assert!(parse("set-config refunds").is_err());
        assert!(parse("set-config refunds retention.ms").is_err());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse("topic").is_err());
        assert!(parse("node x").is_err());
        assert!(parse("schema orders-value").is_err());
        assert!(parse("select orders").is_err());
        assert!(parse("frobnicate").unwrap_err().contains("unknown command"));
    }
}
