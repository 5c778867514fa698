#![forbid(unsafe_code)]

use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use arc_swap::ArcSwap;
use cinder_api::{ClusterApi, RegistryApi};
use cinder_core::config::{ClusterConfig, Config, SchemaRegistryConfig};
use cinder_core::ResourceKey;
use cinder_fetch::Fetcher;
use cinder_store::PageCache;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::bus::EventKind;
use crate::model::UiUpdate;
use crate::status::StatusSender;

/// Builds provider clients for configured clusters and registries.
pub trait Connector: Send + Sync {
    fn cluster(&self, cfg: &ClusterConfig) -> Result<Arc<dyn ClusterApi>>;
    fn registry(&self, cfg: &SchemaRegistryConfig) -> Result<Arc<dyn RegistryApi>>;
}

#[derive(Clone)]
pub struct SelectedCluster {
    pub name: String,
    pub api: Arc<dyn ClusterApi>,
}

#[derive(Clone)]
pub struct SelectedRegistry {
    pub name: String,
    pub api: Arc<dyn RegistryApi>,
}

#[derive(Clone, Default)]
pub struct Selection {
    pub cluster: Option<SelectedCluster>,
    pub registry: Option<SelectedRegistry>,
}

/// Everything background tasks share: config, providers, the page cache and
/// the outbound channels. One per engine instance.
pub struct Context {
    config: Config,
    connector: Arc<dyn Connector>,
    selection: ArcSwap<Selection>,
    cache: Arc<PageCache>,
    timeout: Duration,
    pub(crate) status: StatusSender,
    pub(crate) updates: Sender<UiUpdate>,
    pub(crate) cancel: CancellationToken,
}

impl Context {
    pub fn new(
        config: Config,
        connector: Arc<dyn Connector>,
        status: StatusSender,
        updates: Sender<UiUpdate>,
        cancel: CancellationToken,
    ) -> Self {
        let cache = Arc::new(PageCache::new(config.cache_ttl()));
        let timeout = config.api_timeout();
        Self {
            config,
            connector,
            selection: ArcSwap::from_pointee(Selection::default()),
            cache,
            timeout,
            status,
            updates,
            cancel,
        }
    }

    pub fn config(&self) -> &Config { &self.config }
    pub fn cache(&self) -> &Arc<PageCache> { &self.cache }
    pub fn status(&self) -> &StatusSender { &self.status }
    pub fn cancel_token(&self) -> &CancellationToken { &self.cancel }
    pub fn selection(&self) -> Arc<Selection> { self.selection.load_full() }

    pub fn select_cluster(&self, name: &str) -> Result<()> {
        let cfg = self.config.cluster(name).ok_or_else(|| anyhow!("unknown cluster {name}"))?;
        let api = self.connector.cluster(cfg)?;
        let mut next = Selection::clone(&self.selection.load());
        next.cluster = Some(SelectedCluster { name: cfg.name.clone(), api });
        self.selection.store(Arc::new(next));
        info!(cluster = %name, "cluster selected");
        Ok(())
    }

    pub fn select_registry(&self, name: &str) -> Result<()> {
        let cfg = self
            .config
            .schema_registries
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| anyhow!("unknown schema registry {name}"))?;
        let api = self.connector.registry(cfg)?;
        let mut next = Selection::clone(&self.selection.load());
        next.registry = Some(SelectedRegistry { name: cfg.name.clone(), api });
        self.selection.store(Arc::new(next));
        info!(registry = %name, "schema registry selected");
        Ok(())
    }

    /// Select whatever the config marks as selected. Failures are reported
    /// on the status line, not returned.
    pub fn select_defaults(&self) {
        if let Some(name) = self.config.selected_cluster().map(|c| c.name.clone()) {
            if let Err(e) = self.select_cluster(&name) {
                self.status.error(format!("failed to select cluster {name}: {e:#}"));
            }
        }
        if let Some(name) = self.config.selected_registry().map(|r| r.name.clone()) {
            if let Err(e) = self.select_registry(&name) {
                self.status.error(format!("failed to select schema registry {name}: {e:#}"));
            }
        }
    }

    /// Fetcher bound to the current selection; `None` without a cluster.
    pub fn fetcher(&self) -> Option<Fetcher> {
        let sel = self.selection();
        let cluster = sel.cluster.as_ref()?;
        let fetcher = Fetcher::new(cluster.api.clone(), self.timeout, self.cancel.clone())
            .with_registry(sel.registry.as_ref().map(|r| r.api.clone()));
        Some(fetcher)
    }

    /// Page key for an event under the current selection. `None` when the
    /// event needs a cluster or registry that is not selected, or produces no
    /// page (topic mutations).
    pub fn key_for(&self, kind: &EventKind) -> Option<ResourceKey> {
        let sel = self.selection();
        let cluster = || sel.cluster.as_ref().map(|c| c.name.as_str());
        let registry = || sel.registry.as_ref().map(|r| r.name.as_str());
        let key = match kind {
            EventKind::Clusters => ResourceKey::build(["clusters"]),
            EventKind::Cluster => ResourceKey::build([cluster()?, "info"]),
            EventKind::Nodes => ResourceKey::build([cluster()?, "nodes"]),
            EventKind::Node { id } => ResourceKey::build([cluster()?, "node", id.to_string().as_str()]),
            EventKind::Topics => ResourceKey::build([cluster()?, "topics"]),
            EventKind::Topic { name } => ResourceKey::build([cluster()?, "topic", name.as_str()]),
            EventKind::ConsumerGroups => ResourceKey::build([cluster()?, "consumer groups"]),
            EventKind::ConsumerGroup { name } => ResourceKey::build([cluster()?, "consumer group", name.as_str()]),
            EventKind::Subjects => ResourceKey::build([registry()?, "subjects"]),
            EventKind::Versions { subject } => ResourceKey::build([registry()?, "subject", subject.as_str()]),
            EventKind::Schema { subject, version } => {
                ResourceKey::build([registry()?, "schema", subject.as_str(), version.to_string().as_str()])
            }
            EventKind::CreateTopic { .. } | EventKind::DeleteTopic { .. } | EventKind::UpdateTopicConfig { .. } => {
                return None
            }
        };
        Some(key)
    }
}

/// Key of the clusters list, the page that cannot be closed.
pub fn home_key() -> ResourceKey {
    ResourceKey::build(["clusters"])
}
