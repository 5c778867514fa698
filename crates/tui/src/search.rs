#![forbid(unsafe_code)]

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

use crate::model::{Page, PageBody};

/// Rows of a table page matching `query`, best first; ties keep page order.
/// An empty query returns the page unchanged. Text pages are never filtered.
pub fn filter(page: &Page, query: &str) -> Page {
    let query = query.trim();
    let PageBody::Table { header, rows } = &page.body else {
        return page.clone();
    };
    if query.is_empty() {
        return page.clone();
    }
    let matcher = SkimMatcherV2::default();
    let mut scored: Vec<(i64, usize)> = rows
        .iter()
        .enumerate()
        .filter_map(|(i, row)| {
            let hay = row.join(" ");
            matcher.fuzzy_match(&hay, query).map(|score| (score, i))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    Page {
        title: format!("{} /{query}", page.title),
        body: PageBody::Table {
            header: header.clone(),
            rows: scored.into_iter().map(|(_, i)| rows[i].clone()).collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics() -> Page {
        let rows = ["orders", "payments", "orders-dlq", "audit"]
            .iter()
            .map(|n| vec![n.to_string(), "3".to_string()])
            .collect();
        Page::table("local topics", &["Name", "Partitions"], rows)
    }

    #[test]
    fn fuzzy_query_keeps_matching_rows() {
        let out = filter(&topics(), "ord");
        let names: Vec<&str> = out.rows().iter().map(|r| r[0].as_str()).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"orders") && names.contains(&"orders-dlq"));
    }

    #[test]
    fn empty_query_restores_rows() {
        let page = topics();
        assert_eq!(filter(&page, "  "), page);
        let text = Page::text("t", "body");
        assert_eq!(filter(&text, "x"), text);
    }
}
