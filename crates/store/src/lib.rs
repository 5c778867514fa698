//! Cinder page store: TTL page cache, navigation history, page-to-menu
//! bindings and the opened-pages table.
//!
//! `PageRegistry` is owned by the UI thread. Only its [`PageCache`] is shared
//! with background tasks, so the dispatcher can decide "cached or fetch"
//! without a round trip through the UI.

#![forbid(unsafe_code)]

use std::sync::Arc;

use cinder_core::{Menu, ResourceKey};
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

mod cache;
mod history;

pub use cache::PageCache;
pub use history::History;

/// What the surface must show after a navigation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub key: ResourceKey,
    pub menu: Menu,
    /// Opened-pages row to highlight, when the step moved through history.
    pub row: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRow {
    pub key: ResourceKey,
    pub searchable: bool,
}

pub struct PageRegistry<P> {
    cache: Arc<PageCache>,
    history: History,
    menus: FxHashMap<ResourceKey, Menu>,
    content: FxHashMap<ResourceKey, P>,
    rows: Vec<PageRow>,
    active: Option<ResourceKey>,
}

impl<P> PageRegistry<P> {
    pub fn new(cache: Arc<PageCache>) -> Self {
        Self {
            cache,
            history: History::new(),
            menus: FxHashMap::default(),
            content: FxHashMap::default(),
            rows: Vec::new(),
            active: None,
        }
    }

    pub fn cache(&self) -> &Arc<PageCache> { &self.cache }
    pub fn history(&self) -> &History { &self.history }
    pub fn rows(&self) -> &[PageRow] { &self.rows }
    pub fn menu_of(&self, key: &ResourceKey) -> Option<Menu> { self.menus.get(key).copied() }
    pub fn content(&self, key: &ResourceKey) -> Option<&P> { self.content.get(key) }
    pub fn content_mut(&mut self, key: &ResourceKey) -> Option<&mut P> { self.content.get_mut(key) }

    /// Page currently shown. Differs from the history position after
    /// `switch_to` or `select_row`.
    pub fn current(&self) -> Option<&ResourceKey> { self.active.as_ref() }

    pub fn row_of(&self, key: &ResourceKey) -> Option<usize> {
        self.rows.iter().position(|r| &r.key == key)
    }

    /// Switch to the cached page for `key` if it is present and unexpired,
    /// otherwise run `on_miss` (which is expected to end in `add_page`).
    pub fn check_cache<F: FnOnce()>(&mut self, key: &ResourceKey, on_miss: F) -> Option<Navigation> {
        if self.cache.contains(key) {
            if let Some(nav) = self.switch_to(key) {
                debug!(key = %key, "page cache hit");
                return Some(nav);
            }
        }
        debug!(key = %key, "page cache miss");
        on_miss();
        None
    }

    /// Insert or replace a page and make it active.
    ///
    /// A known key keeps its history entries and table row; only the content
    /// and menu change. A new key gets a row and a history push.
    pub fn add_page(&mut self, key: ResourceKey, page: P, menu: Menu, searchable: bool) -> Navigation {
        if let Some(row) = self.row_of(&key) {
            self.rows[row].searchable = searchable;
            debug!(key = %key, row, "page replaced");
        } else {
            self.rows.push(PageRow { key: key.clone(), searchable });
            self.history.push(key.clone());
            debug!(key = %key, history = self.history.len(), "page added");
        }
        self.content.insert(key.clone(), page);
        self.menus.insert(key.clone(), menu);
        self.cache.touch(&key);
        self.active = Some(key.clone());
        Navigation { key, menu, row: None }
    }

    /// Show a page already in the table. Unknown keys are a miss, not an error.
    pub fn switch_to(&mut self, key: &ResourceKey) -> Option<Navigation> {
        let menu = self.menus.get(key).copied()?;
        if !self.content.contains_key(key) {
            return None;
        }
        self.active = Some(key.clone());
        Some(Navigation { key: key.clone(), menu, row: None })
    }

    pub fn forward(&mut self) -> Option<Navigation> {
        let key = self.history.forward()?.clone();
        self.show_history_entry(key)
    }

    pub fn backward(&mut self) -> Option<Navigation> {
        let key = self.history.backward()?.clone();
        self.show_history_entry(key)
    }

    /// Jump to an opened-pages row. History position is unchanged.
    pub fn select_row(&mut self, ordinal: usize) -> Option<Navigation> {
        let key = self.rows.get(ordinal)?.key.clone();
        self.switch_to(&key)
    }

    /// Drop a page everywhere: table row, every history occurrence, cache
    /// entry, content and menu binding. Returns the page to show next, if any.
    ///
    /// Protecting "home" pages is the caller's business.
    pub fn remove_page(&mut self, key: &ResourceKey) -> Option<Navigation> {
        let Some(row) = self.row_of(key) else {
            debug!(key = %key, "remove_page: unknown page");
            return None;
        };
        self.rows.remove(row);
        let removed = self.history.remove_all(key);
        self.cache.remove(key);
        self.content.remove(key);
        self.menus.remove(key);
        debug!(key = %key, row, removed, history = self.history.len(), "page removed");

        let next = self.history.current().cloned();
        match next {
            Some(next) => self.show_history_entry(next),
            None => {
                self.active = None;
                None
            }
        }
    }

    fn show_history_entry(&mut self, key: ResourceKey) -> Option<Navigation> {
        let Some(menu) = self.menus.get(&key).copied() else {
            debug_assert!(false, "history entry {key} has no menu binding");
            warn!(key = %key, "history entry without menu binding");
            return None;
        };
        let row = self.row_of(&key);
        self.active = Some(key.clone());
        Some(Navigation { key, menu, row })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::time::Duration;

    use super::*;

    fn registry() -> PageRegistry<&'static str> {
        PageRegistry::new(Arc::new(PageCache::new(Duration::from_secs(300))))
    }

    fn k(s: &str) -> ResourceKey {
        ResourceKey::from(s)
    }

    #[test]
    fn check_cache_hit_never_runs_on_miss() {
        let mut reg = registry();
        reg.add_page(k("local:topics"), "topics", Menu::Topics, true);
        let missed = Cell::new(false);
        let nav = reg.check_cache(&k("local:topics"), || missed.set(true));
        assert!(!missed.get());
        assert_eq!(nav.map(|n| n.menu), Some(Menu::Topics));

        let nav = reg.check_cache(&k("local:nodes"), || missed.set(true));
        assert!(missed.get());
        assert!(nav.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_a_miss() {
        let mut reg = registry();
        reg.add_page(k("local:topics"), "topics", Menu::Topics, true);
        tokio::time::advance(Duration::from_secs(301)).await;
        let missed = Cell::new(false);
        reg.check_cache(&k("local:topics"), || missed.set(true));
        assert!(missed.get());
    }

    #[test]
    fn add_page_replaces_in_place() {
        let mut reg = registry();
        reg.add_page(k("a"), "v1", Menu::Final, false);
        reg.add_page(k("b"), "b", Menu::Final, false);
        reg.add_page(k("a"), "v2", Menu::Topics, true);
        assert_eq!(reg.rows().len(), 2);
        assert_eq!(reg.history().keys().iter().filter(|x| **x == k("a")).count(), 1);
        assert_eq!(reg.content(&k("a")), Some(&"v2"));
        assert_eq!(reg.menu_of(&k("a")), Some(Menu::Topics));
        assert_eq!(reg.current(), Some(&k("a")));
    }

    #[test]
    fn navigation_reports_menu_and_row() {
        let mut reg = registry();
        reg.add_page(k("clusters"), "c", Menu::Clusters, true);
        reg.add_page(k("local:topics"), "t", Menu::Topics, true);
        let back = reg.backward().expect("back");
        assert_eq!(back, Navigation { key: k("clusters"), menu: Menu::Clusters, row: Some(0) });
        assert!(reg.backward().is_none());
        let fwd = reg.forward().expect("forward");
        assert_eq!(fwd.key, k("local:topics"));
        assert!(reg.forward().is_none());
    }

    #[test]
    fn select_row_keeps_history_position() {
        let mut reg = registry();
        reg.add_page(k("a"), "a", Menu::Final, false);
        reg.add_page(k("b"), "b", Menu::Final, false);
        let nav = reg.select_row(0).expect("row");
        assert_eq!(nav.key, k("a"));
        assert_eq!(reg.current(), Some(&k("a")));
        assert_eq!(reg.history().index(), 1);
        assert!(reg.select_row(7).is_none());
    }

    #[test]
    fn remove_page_clears_everything_and_shows_neighbour() {
        let mut reg = registry();
        reg.add_page(k("a"), "a", Menu::Clusters, true);
        reg.add_page(k("b"), "b", Menu::Topics, true);
        reg.add_page(k("c"), "c", Menu::Final, false);

        let nav = reg.remove_page(&k("c")).expect("next");
        assert_eq!(nav.key, k("b"));
        assert_eq!(nav.menu, Menu::Topics);
        assert!(reg.content(&k("c")).is_none());
        assert!(reg.menu_of(&k("c")).is_none());
        assert!(!reg.cache().contains(&k("c")));
        assert_eq!(reg.rows().iter().map(|r| r.key.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);

        reg.remove_page(&k("a"));
        reg.remove_page(&k("b"));
        assert!(reg.current().is_none());
        assert!(reg.remove_page(&k("b")).is_none());
    }
}
