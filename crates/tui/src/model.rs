#![forbid(unsafe_code)]

use cinder_core::{Menu, ResourceKey};

use crate::bus::EventKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageBody {
    Table { header: Vec<String>, rows: Vec<Vec<String>> },
    Text(String),
}

/// A rendered result, ready for the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub title: String,
    pub body: PageBody,
}

impl Page {
    pub fn text(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self { title: title.into(), body: PageBody::Text(text.into()) }
    }

    pub fn table(title: impl Into<String>, header: &[&str], rows: Vec<Vec<String>>) -> Self {
        Self {
            title: title.into(),
            body: PageBody::Table { header: header.iter().map(|h| h.to_string()).collect(), rows },
        }
    }

    pub fn rows(&self) -> &[Vec<String>] {
        match &self.body {
            PageBody::Table { rows, .. } => rows,
            PageBody::Text(_) => &[],
        }
    }
}

/// Results sent from background tasks to the UI thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiUpdate {
    /// A fetch finished; insert (or replace) the page and show it.
    PageReady {
        key: ResourceKey,
        page: Page,
        menu: Menu,
        searchable: bool,
        /// Event that produced the page, replayed with `force` on refresh.
        origin: EventKind,
    },
    /// The page is cached; show it without refetching.
    SwitchTo(ResourceKey),
    StatusLine(String),
}
