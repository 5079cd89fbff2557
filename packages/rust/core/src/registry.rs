//! Deduplicating source registry.
//!
//! Every citable document consulted during a run is registered here exactly
//! once. The first registration of a URL assigns the next citation number;
//! later registrations of the same URL return that number unchanged.

use std::collections::HashMap;

use serde::Serialize;

use shallowdive_shared::{Document, SourceEntry};

/// Rendered in place of a bibliography when nothing was cited.
pub const NO_SOURCES_LINE: &str = "No sources cited.";

/// Append-only store of cited documents, keyed by URL.
///
/// Invariant: `index[url] == n` iff `entries[n - 1].document.url == url`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceRegistry {
    entries: Vec<SourceEntry>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `document` and return its citation number.
    ///
    /// Idempotent per URL, ignoring surrounding whitespace: a known URL
    /// returns its existing number and the stored document is left untouched.
    pub fn register(&mut self, document: &Document) -> usize {
        let url = document.url.trim();
        if let Some(&number) = self.index.get(url) {
            return number;
        }

        let number = self.entries.len() + 1;
        let mut stored = document.clone();
        stored.url = url.to_string();
        self.index.insert(stored.url.clone(), number);
        self.entries.push(SourceEntry {
            number,
            document: stored,
        });
        number
    }

    /// Citation number previously assigned to `url`, if any.
    pub fn number_of(&self, url: &str) -> Option<usize> {
        self.index.get(url.trim()).copied()
    }

    /// Entries in ascending citation-number order.
    pub fn entries(&self) -> &[SourceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One line per entry, ascending by number. An empty registry renders a
    /// single [`NO_SOURCES_LINE`].
    pub fn render_bibliography(&self) -> Vec<String> {
        if self.entries.is_empty() {
            return vec![NO_SOURCES_LINE.to_string()];
        }

        self.entries
            .iter()
            .map(|entry| {
                let doc = &entry.document;
                format!(
                    "[{}] {}. Retrieved {}. {}",
                    entry.number,
                    doc.title.trim(),
                    doc.retrieved_at.format("%Y-%m-%d"),
                    doc.url
                )
            })
            .collect()
    }
}
