#![forbid(unsafe_code)]

//! Event dispatcher: one FIFO subscriber loop per channel.
//!
//! Handlers decide between "show the cached page" and "fetch". Fetches run in
//! their own tasks under the context's cancellation token, so a slow describe
//! never stalls the channel it came from.

use std::sync::Arc;

use cinder_api::{NewTopic, TopicConfig};
use cinder_core::Menu;
use cinder_fetch::{FetchError, Fetcher};
use metrics::counter;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::model::{Page, UiUpdate};
use crate::render;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Clusters,
    Nodes,
    Topics,
    ConsumerGroups,
    Subjects,
}

impl Channel {
    pub const ALL: [Channel; 5] =
        [Channel::Clusters, Channel::Nodes, Channel::Topics, Channel::ConsumerGroups, Channel::Subjects];

    pub fn label(&self) -> &'static str {
        match self {
            Channel::Clusters => "clusters",
            Channel::Nodes => "nodes",
            Channel::Topics => "topics",
            Channel::ConsumerGroups => "consumer_groups",
            Channel::Subjects => "subjects",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Clusters,
    Cluster,
    Nodes,
    Node { id: i32 },
    Topics,
    Topic { name: String },
    ConsumerGroups,
    ConsumerGroup { name: String },
    Subjects,
    Versions { subject: String },
    Schema { subject: String, version: i32 },
    CreateTopic { topic: NewTopic },
    DeleteTopic { name: String },
    UpdateTopicConfig { name: String, config: TopicConfig },
}

impl EventKind {
    /// The channel whose loop handles this kind.
    pub fn channel(&self) -> Channel {
        match self {
            EventKind::Clusters | EventKind::Cluster => Channel::Clusters,
            EventKind::Nodes | EventKind::Node { .. } => Channel::Nodes,
            EventKind::Topics
            | EventKind::Topic { .. }
            | EventKind::CreateTopic { .. }
            | EventKind::DeleteTopic { .. }
            | EventKind::UpdateTopicConfig { .. } => Channel::Topics,
            EventKind::ConsumerGroups | EventKind::ConsumerGroup { .. } => Channel::ConsumerGroups,
            EventKind::Subjects | EventKind::Versions { .. } | EventKind::Schema { .. } => Channel::Subjects,
        }
    }

    pub fn menu(&self) -> Menu {
        match self {
            EventKind::Clusters => Menu::Clusters,
            EventKind::Nodes => Menu::Nodes,
            EventKind::Topics
            | EventKind::CreateTopic { .. }
            | EventKind::DeleteTopic { .. }
            | EventKind::UpdateTopicConfig { .. } => Menu::Topics,
            EventKind::ConsumerGroups => Menu::ConsumerGroups,
            EventKind::Subjects => Menu::Subjects,
            EventKind::Versions { .. } => Menu::Versions,
            EventKind::Cluster
            | EventKind::Node { .. }
            | EventKind::Topic { .. }
            | EventKind::ConsumerGroup { .. }
            | EventKind::Schema { .. } => Menu::Final,
        }
    }

    /// Mutations produce no page of their own.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            EventKind::CreateTopic { .. } | EventKind::DeleteTopic { .. } | EventKind::UpdateTopicConfig { .. }
        )
    }

    /// Lists are searchable tables; describes are text.
    pub fn searchable(&self) -> bool {
        self.menu() != Menu::Final
    }

    /// Verb phrase for error messages, e.g. "describe topic".
    fn action(&self) -> String {
        match self {
            EventKind::Clusters => "list clusters".into(),
            EventKind::Cluster => "describe cluster".into(),
            EventKind::Nodes => "list nodes".into(),
            EventKind::Node { id } => format!("describe node {id}"),
            EventKind::Topics => "list topics".into(),
            EventKind::Topic { name } => format!("describe topic {name}"),
            EventKind::ConsumerGroups => "list consumer groups".into(),
            EventKind::ConsumerGroup { name } => format!("describe consumer group {name}"),
            EventKind::Subjects => "list subjects".into(),
            EventKind::Versions { subject } => format!("list versions of {subject}"),
            EventKind::Schema { subject, version } => format!("describe schema {subject} v{version}"),
            EventKind::CreateTopic { topic } => format!("create topic {}", topic.name),
            EventKind::DeleteTopic { name } => format!("delete topic {name}"),
            EventKind::UpdateTopicConfig { name, .. } => format!("update config of topic {name}"),
        }
    }

    /// Progressive form, e.g. "describing topic".
    fn activity(&self) -> String {
        let action = self.action();
        let (verb, rest) = action.split_once(' ').unwrap_or((action.as_str(), ""));
        let ing = match verb {
            "describe" => "describing",
            "list" => "listing",
            "create" => "creating",
            "delete" => "deleting",
            "update" => "updating",
            other => other,
        };
        format!("{ing} {rest}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    /// Refetch even when the page is cached.
    pub force: bool,
}

/// Publishing half of the bus. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    channels: Arc<FxHashMap<Channel, mpsc::UnboundedSender<Event>>>,
}

impl Dispatcher {
    /// Start one subscriber loop per channel. Loops stop when the context's
    /// token is cancelled.
    pub fn spawn(ctx: Arc<Context>) -> Self {
        let mut channels = FxHashMap::default();
        for channel in Channel::ALL {
            let (tx, rx) = mpsc::unbounded_channel();
            channels.insert(channel, tx);
            tokio::spawn(run_channel(channel, rx, ctx.clone()));
        }
        Self { channels: Arc::new(channels) }
    }

    /// Enqueue without waiting. Returns false once the loop has stopped.
    pub fn publish(&self, channel: Channel, kind: EventKind, force: bool) -> bool {
        debug!(channel = channel.label(), ?kind, force, "publish");
        match self.channels.get(&channel) {
            Some(tx) => tx.send(Event { kind, force }).is_ok(),
            None => false,
        }
    }

    /// Publish on the kind's own channel.
    pub fn request(&self, kind: EventKind, force: bool) -> bool {
        self.publish(kind.channel(), kind, force)
    }
}

async fn run_channel(channel: Channel, mut rx: mpsc::UnboundedReceiver<Event>, ctx: Arc<Context>) {
    let cancel = ctx.cancel.clone();
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            ev = rx.recv() => match ev {
                Some(ev) => handle(channel, ev, &ctx),
                None => break,
            },
        }
    }
    info!(channel = channel.label(), "event loop stopped");
}

fn handle(channel: Channel, ev: Event, ctx: &Arc<Context>) {
    if ev.kind.channel() != channel {
        counter!("events_dropped_total", 1, "channel" => channel.label());
        warn!(channel = channel.label(), kind = ?ev.kind, "event on wrong channel; dropped");
        return;
    }
    counter!("events_total", 1, "channel" => channel.label());

    if ev.kind == EventKind::Clusters {
        let selected = ctx.selection().cluster.as_ref().map(|c| c.name.clone());
        let page = render::clusters(ctx.config(), selected.as_deref());
        deliver(ctx, crate::context::home_key(), page, ev.kind);
        return;
    }

    if ev.kind.is_mutation() {
        let Some(fetcher) = ctx.fetcher() else {
            ctx.status.error("to perform operation, select cluster");
            return;
        };
        ctx.status.send_infinite(format!("{}...", ev.kind.activity()));
        tokio::spawn(mutate(ctx.clone(), fetcher, ev.kind));
        return;
    }

    let Some(key) = ctx.key_for(&ev.kind) else {
        let what = if ev.kind.channel() == Channel::Subjects { "schema registry" } else { "cluster" };
        ctx.status.error(format!("to perform operation, select {what}"));
        return;
    };
    if !ev.force && ctx.cache().contains(&key) {
        debug!(key = %key, "cached; switching");
        let _ = ctx.updates.send(UiUpdate::SwitchTo(key));
        return;
    }
    let Some(fetcher) = ctx.fetcher() else {
        ctx.status.error("to perform operation, select cluster");
        return;
    };

    ctx.status.send_infinite(format!("{}...", ev.kind.activity()));
    let ctx = ctx.clone();
    tokio::spawn(async move {
        let kind = ev.kind;
        let cluster = fetcher.cluster_name().to_string();
        let registry = ctx.selection().registry.as_ref().map(|r| r.name.clone()).unwrap_or_default();
        let res: Result<Page, FetchError> = match &kind {
            EventKind::Clusters => return,
            EventKind::Cluster => fetcher.describe_cluster().await.map(|o| render::cluster(&o)),
            EventKind::Nodes => fetcher.list_nodes().await.map(|n| render::nodes(&cluster, &n)),
            EventKind::Node { id } => fetcher.describe_node(*id).await.map(|n| render::node(&cluster, &n)),
            EventKind::Topics => fetcher.list_topics().await.map(|t| render::topics(&cluster, &t)),
            EventKind::Topic { name } => fetcher.describe_topic(name).await.map(|d| render::topic(&d)),
            EventKind::ConsumerGroups => {
                fetcher.list_consumer_groups().await.map(|g| render::consumer_groups(&cluster, &g))
            }
            EventKind::ConsumerGroup { name } => {
                fetcher.describe_consumer_group(name).await.map(|g| render::consumer_group(&g))
            }
            EventKind::Subjects => fetcher.list_subjects().await.map(|s| render::subjects(&registry, &s)),
            EventKind::Versions { subject } => {
                fetcher.list_versions(subject).await.map(|v| render::versions(subject, &v))
            }
            EventKind::Schema { subject, version } => {
                fetcher.describe_schema(subject, *version).await.map(|s| render::schema(&s))
            }
            EventKind::CreateTopic { .. } | EventKind::DeleteTopic { .. } | EventKind::UpdateTopicConfig { .. } => {
                return
            }
        };
        match res {
            Ok(page) => {
                deliver(&ctx, key, page, kind);
                ctx.status.clear();
            }
            Err(FetchError::Cancelled) => debug!(key = %key, "fetch cancelled"),
            Err(FetchError::Timeout(_)) => {
                warn!(key = %key, "timeout while {}", kind.activity());
                ctx.status.error(format!("timeout while {}", kind.activity()));
            }
            Err(FetchError::Remote(e)) => {
                warn!(key = %key, error = %e, "failed to {}", kind.action());
                ctx.status.error(format!("failed to {}: {e}", kind.action()));
            }
        }
    });
}

/// Run a topic mutation, then drop the pages it made stale. Create and
/// delete also republish the topic list.
async fn mutate(ctx: Arc<Context>, fetcher: Fetcher, kind: EventKind) {
    let res = match &kind {
        EventKind::CreateTopic { topic } => fetcher.create_topic(topic.clone()).await,
        EventKind::DeleteTopic { name } => fetcher.delete_topic(name).await,
        EventKind::UpdateTopicConfig { name, config } => fetcher.update_topic_config(name, config.clone()).await,
        _ => return,
    };
    match res {
        Ok(()) => {
            let (name, done) = match &kind {
                EventKind::CreateTopic { topic } => (topic.name.clone(), "has been created"),
                EventKind::DeleteTopic { name } => (name.clone(), "has been deleted"),
                EventKind::UpdateTopicConfig { name, .. } => (name.clone(), "config has been updated"),
                _ => return,
            };
            info!(topic = %name, "{}", kind.action());
            let stale = [EventKind::Topics, EventKind::Topic { name: name.clone() }];
            for key in stale.iter().filter_map(|k| ctx.key_for(k)) {
                ctx.cache().remove(&key);
            }
            ctx.status.send_default_ttl(format!("topic {name} {done}"));
            if matches!(kind, EventKind::UpdateTopicConfig { .. }) {
                return;
            }
            let Some(key) = ctx.key_for(&EventKind::Topics) else { return };
            match fetcher.list_topics().await {
                Ok(topics) => {
                    let page = render::topics(fetcher.cluster_name(), &topics);
                    deliver(&ctx, key, page, EventKind::Topics);
                }
                Err(FetchError::Cancelled) => {}
                Err(e) => warn!(error = %e, "topic list refresh failed"),
            }
        }
        Err(FetchError::Cancelled) => debug!(kind = ?kind, "mutation cancelled"),
        Err(FetchError::Timeout(_)) => {
            warn!("timeout while {}", kind.activity());
            ctx.status.error(format!("timeout while {}", kind.activity()));
        }
        Err(FetchError::Remote(e)) => {
            warn!(error = %e, "failed to {}", kind.action());
            ctx.status.error(format!("failed to {}: {e}", kind.action()));
        }
    }
}

fn deliver(ctx: &Context, key: cinder_core::ResourceKey, page: Page, origin: EventKind) {
    let update = UiUpdate::PageReady {
        key,
        page,
        menu: origin.menu(),
        searchable: origin.searchable(),
        origin,
    };
    if ctx.updates.send(update).is_err() {
        debug!("ui gone; page discarded");
    }
}
