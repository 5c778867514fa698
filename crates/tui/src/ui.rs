#![forbid(unsafe_code)]

use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;

use cinder_core::{Menu, ResourceKey};
use cinder_store::{Navigation, PageRegistry};
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::bus::{Dispatcher, EventKind};
use crate::context::{home_key, Context};
use crate::model::{Page, UiUpdate};
use crate::render;
use crate::search;
use crate::status::SharedStatusHistory;

/// Updates applied per `drain` call.
pub const MAX_UPDATES_PER_DRAIN: usize = 256;

/// Rendering side, implemented by the terminal front end.
pub trait Surface {
    fn show(&mut self, key: &ResourceKey, page: &Page);
    fn set_menu(&mut self, menu: Menu);
    fn set_status(&mut self, text: &str);
    /// First cell of the selected table row, if any.
    fn selection(&self) -> Option<String>;
}

/// UI-thread state. Owns the page registry; background tasks reach it only
/// through the update channel.
pub struct Ui {
    ctx: Arc<Context>,
    dispatcher: Dispatcher,
    registry: PageRegistry<Page>,
    origins: FxHashMap<ResourceKey, EventKind>,
    updates: Receiver<UiUpdate>,
    history: SharedStatusHistory,
    surface: Box<dyn Surface>,
    menu: Option<Menu>,
    status_line: String,
}

impl Ui {
    pub fn new(
        ctx: Arc<Context>,
        dispatcher: Dispatcher,
        updates: Receiver<UiUpdate>,
        history: SharedStatusHistory,
        surface: Box<dyn Surface>,
    ) -> Self {
        let registry = PageRegistry::new(ctx.cache().clone());
        Self {
            ctx,
            dispatcher,
            registry,
            origins: FxHashMap::default(),
            updates,
            history,
            surface,
            menu: None,
            status_line: String::new(),
        }
    }

    pub fn registry(&self) -> &PageRegistry<Page> { &self.registry }
    pub fn menu(&self) -> Option<Menu> { self.menu }
    pub fn status_line(&self) -> &str { &self.status_line }
    pub fn context(&self) -> &Arc<Context> { &self.ctx }
    pub fn dispatcher(&self) -> &Dispatcher { &self.dispatcher }

    /// Apply pending updates; returns how many were applied.
    pub fn drain(&mut self) -> usize {
        let mut processed = 0usize;
        while processed < MAX_UPDATES_PER_DRAIN {
            match self.updates.try_recv() {
                Ok(update) => {
                    self.apply(update);
                    processed += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("update channel closed");
                    break;
                }
            }
        }
        processed
    }

    fn apply(&mut self, update: UiUpdate) {
        match update {
            UiUpdate::PageReady { key, page, menu, searchable, origin } => {
                info!(key = %key, "ui: page ready");
                self.origins.insert(key.clone(), origin);
                let nav = self.registry.add_page(key, page, menu, searchable);
                self.show(nav);
            }
            UiUpdate::SwitchTo(key) => match self.registry.switch_to(&key) {
                Some(nav) => self.show(nav),
                // Cached in the shared index but closed here since.
                None => match self.origins.get(&key).cloned() {
                    Some(kind) => {
                        self.dispatcher.request(kind, true);
                    }
                    None => debug!(key = %key, "switch to unknown page ignored"),
                },
            },
            UiUpdate::StatusLine(text) => {
                self.surface.set_status(&text);
                self.status_line = text;
            }
        }
    }

    fn show(&mut self, nav: Navigation) {
        self.menu = Some(nav.menu);
        self.surface.set_menu(nav.menu);
        if let Some(page) = self.registry.content(&nav.key) {
            self.surface.show(&nav.key, page);
        }
    }

    /// Open a page: cached pages are shown directly, anything else is
    /// published for fetching.
    pub fn open(&mut self, kind: EventKind) {
        let Some(key) = self.ctx.key_for(&kind) else {
            self.dispatcher.request(kind, false);
            return;
        };
        let dispatcher = &self.dispatcher;
        if let Some(nav) = self.registry.check_cache(&key, || {
            dispatcher.request(kind, false);
        }) {
            self.show(nav);
        }
    }

    /// Refetch the current page.
    pub fn refresh(&mut self) {
        let Some(key) = self.registry.current().cloned() else { return };
        match self.origins.get(&key).cloned() {
            Some(kind) => {
                self.dispatcher.request(kind, true);
            }
            None => warn!(key = %key, "refresh: page has no origin"),
        }
    }

    pub fn forward(&mut self) {
        if let Some(nav) = self.registry.forward() {
            self.show(nav);
        }
    }

    pub fn backward(&mut self) {
        if let Some(nav) = self.registry.backward() {
            self.show(nav);
        }
    }

    /// Close the current page. The clusters list stays.
    pub fn close_current(&mut self) {
        let Some(key) = self.registry.current().cloned() else { return };
        if key == home_key() {
            self.ctx.status().error("clusters page cannot be closed");
            return;
        }
        self.origins.remove(&key);
        if let Some(nav) = self.registry.remove_page(&key) {
            self.show(nav);
        }
    }

    /// Show the current table page narrowed to `query`. The stored page is
    /// untouched; an empty query shows it in full again.
    pub fn filter(&mut self, query: &str) {
        let Some(key) = self.registry.current().cloned() else { return };
        let searchable = self.registry.rows().iter().any(|r| r.key == key && r.searchable);
        if !searchable {
            return;
        }
        if let Some(page) = self.registry.content(&key) {
            let filtered = search::filter(page, query);
            self.surface.show(&key, &filtered);
        }
    }

    /// Opened pages as a table; not itself registered.
    pub fn show_opened_pages(&mut self) {
        let rows = self
            .registry
            .rows()
            .iter()
            .enumerate()
            .map(|(i, r)| vec![i.to_string(), r.key.to_string()])
            .collect();
        let page = Page::table("Pages", &["#", "Key"], rows);
        self.menu = Some(Menu::OpenedPages);
        self.surface.set_menu(Menu::OpenedPages);
        self.surface.show(&ResourceKey::build(["opened pages"]), &page);
    }

    pub fn show_status_history(&mut self) {
        let page = match self.history.lock() {
            Ok(h) => render::status_history(h.lines()),
            Err(_) => return,
        };
        let nav = self.registry.add_page(ResourceKey::build(["status history"]), page, Menu::StatusHistory, false);
        self.show(nav);
    }

    /// Enter on the current selection, interpreted by the active menu.
    pub fn activate(&mut self) {
        let Some(menu) = self.menu else { return };
        let Some(sel) = self.surface.selection() else { return };
        match menu {
            Menu::Clusters => match self.ctx.select_cluster(&sel) {
                Ok(()) => {
                    self.ctx.status().send_default_ttl(format!("selected cluster {sel}"));
                    // Refresh the selection marker.
                    self.dispatcher.request(EventKind::Clusters, true);
                }
                Err(e) => self.ctx.status().error(format!("failed to select cluster {sel}: {e:#}")),
            },
            Menu::Nodes => match sel.parse::<i32>() {
                Ok(id) => self.open(EventKind::Node { id }),
                Err(_) => warn!(selection = %sel, "node id is not a number"),
            },
            Menu::Topics => self.open(EventKind::Topic { name: sel }),
            Menu::ConsumerGroups => self.open(EventKind::ConsumerGroup { name: sel }),
            Menu::Subjects => self.open(EventKind::Versions { subject: sel }),
            Menu::Versions => {
                let subject = self.registry.current().and_then(|k| match self.origins.get(k) {
                    Some(EventKind::Versions { subject }) => Some(subject.clone()),
                    _ => None,
                });
                match (subject, sel.parse::<i32>()) {
                    (Some(subject), Ok(version)) => self.open(EventKind::Schema { subject, version }),
                    _ => warn!(selection = %sel, "no schema version under selection"),
                }
            }
            Menu::OpenedPages => {
                if let Some(nav) = sel.parse::<usize>().ok().and_then(|i| self.registry.select_row(i)) {
                    self.show(nav);
                }
            }
            Menu::Final | Menu::StatusHistory => {}
        }
    }
}
