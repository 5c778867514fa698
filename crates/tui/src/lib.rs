//! Cinder UI engine.
//!
//! Ties the pieces together: an event [`Dispatcher`] turning requests into
//! fetches, a status line task, and the UI-thread [`Ui`] state that owns the
//! page registry and drives a [`Surface`]. Background tasks never touch UI
//! state; they send [`UiUpdate`]s which `Ui::drain` applies on the UI thread.

#![forbid(unsafe_code)]

use std::sync::Arc;

use cinder_core::config::Config;
use cinder_store::PageCache;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub mod bus;
pub mod context;
pub mod model;
pub mod render;
pub mod search;
pub mod status;
pub mod ui;

pub use bus::{Channel, Dispatcher, Event, EventKind};
pub use context::{Connector, Context, Selection};
pub use model::{Page, PageBody, UiUpdate};
pub use status::{StatusMessage, StatusSender};
pub use ui::{Surface, Ui};

/// Start the background half (status line, dispatcher loops, cache janitor)
/// and return the UI-thread half. Must run inside a Tokio runtime; everything
/// spawned here stops when `cancel` fires.
pub fn start(
    config: Config,
    connector: Arc<dyn Connector>,
    surface: Box<dyn Surface>,
    cancel: CancellationToken,
) -> Ui {
    let (status, status_rx) = status::status_channel();
    let (updates_tx, updates_rx) = std::sync::mpsc::channel();
    let history = status::SharedStatusHistory::default();
    let ctx = Arc::new(Context::new(config, connector, status, updates_tx.clone(), cancel.clone()));

    tokio::spawn(status::run_status_line(status_rx, history.clone(), updates_tx, cancel.clone()));
    tokio::spawn(run_janitor(ctx.cache().clone(), cancel));
    let dispatcher = Dispatcher::spawn(ctx.clone());

    ctx.select_defaults();
    dispatcher.request(EventKind::Clusters, false);
    info!(clusters = ctx.config().clusters.len(), "engine started");
    Ui::new(ctx, dispatcher, updates_rx, history, surface)
}

async fn run_janitor(cache: Arc<PageCache>, cancel: CancellationToken) {
    let mut tick = tokio::time::interval(cache.ttl());
    tick.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {
                cache.purge_expired();
            }
        }
    }
    debug!("cache janitor stopped");
}
