use std::io::Write;
use std::sync::{Arc, Mutex};

use cinder_core::{Menu, ResourceKey};
use cinder_tui::status::SPINNER_FRAMES;
use cinder_tui::{Page, PageBody, Surface};

/// Prints pages to stdout; the selection is set by the `select` command.
#[derive(Default)]
pub struct StdoutSurface {
    picker: Picker,
    status: String,
}

/// Rows of the last table printed and the row picked from it.
#[derive(Debug, Default)]
pub struct Rows {
    first_cells: Vec<String>,
    selected: Option<String>,
}

impl Rows {
    /// Pick by the ordinal printed in front of the row.
    pub fn select(&mut self, row: usize) -> Result<&str, String> {
        let cell = self
            .first_cells
            .get(row)
            .cloned()
            .ok_or_else(|| format!("no row {row}; the last table has {} rows", self.first_cells.len()))?;
        Ok(self.selected.insert(cell).as_str())
    }
}

/// Shared with the shell loop, which owns the input side.
pub type Picker = Arc<Mutex<Rows>>;

impl StdoutSurface {
    pub fn new(picker: Picker) -> Self {
        Self { picker, status: String::new() }
    }
}

fn print_table(out: &mut impl Write, header: &[String], rows: &[Vec<String>]) -> std::io::Result<()> {
    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }
    let line = |cells: &[String]| {
        cells
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{c:<w$}", w = widths.get(i).copied().unwrap_or(0)))
            .collect::<Vec<_>>()
            .join("  ")
    };
    writeln!(out, "   {}", line(header).trim_end())?;
    for (i, row) in rows.iter().enumerate() {
        writeln!(out, "{i:>2} {}", line(row).trim_end())?;
    }
    Ok(())
}

impl Surface for StdoutSurface {
    fn show(&mut self, key: &ResourceKey, page: &Page) {
        if let Ok(mut rows) = self.picker.lock() {
            rows.selected = None;
            rows.first_cells = match &page.body {
                PageBody::Table { rows: table, .. } => {
                    table.iter().map(|r| r.first().cloned().unwrap_or_default()).collect()
                }
                PageBody::Text(_) => Vec::new(),
            };
        }
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "── {} [{key}]", page.title);
        let _ = match &page.body {
            PageBody::Table { header, rows } => print_table(&mut out, header, rows),
            PageBody::Text(text) => write!(out, "{text}"),
        };
        let _ = out.flush();
    }

    fn set_menu(&mut self, menu: Menu) {
        tracing::debug!(menu = menu.label(), "menu");
    }

    fn set_status(&mut self, text: &str) {
        // Spinner frames repeat the same message; print it once.
        let bare = text
            .split_once(' ')
            .filter(|(frame, _)| SPINNER_FRAMES.contains(frame))
            .map(|(_, t)| t)
            .unwrap_or(text);
        if !bare.is_empty() && bare != self.status {
            println!(":: {bare}");
        }
        self.status = bare.to_string();
    }

    fn selection(&self) -> Option<String> {
        self.picker.lock().ok().and_then(|r| r.selected.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_resolves_the_printed_ordinal() {
        let picker = Picker::default();
        let mut surface = StdoutSurface::new(picker.clone());
        let page = Page::table("Nodes", &["ID", "Host"], vec![
            vec!["3".into(), "kafka-3".into()],
            vec!["1".into(), "kafka-1".into()],
        ]);
        surface.show(&ResourceKey::build(["local", "nodes"]), &page);

        assert_eq!(picker.lock().expect("lock").select(1), Ok("1"));
        assert_eq!(surface.selection().as_deref(), Some("1"));
        assert!(picker.lock().expect("lock").select(2).is_err());

        surface.show(&ResourceKey::build(["local", "info"]), &Page::text("Cluster", "id: abc\n"));
        assert_eq!(surface.selection(), None);
        assert!(picker.lock().expect("lock").select(0).is_err());
    }
}
