//! Core domain types for Shallow Dive research runs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of characters kept from a document snippet.
pub const SNIPPET_MAX_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Company
// ---------------------------------------------------------------------------

/// The company a run researches. Also the row format of batch input files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    /// Display name, e.g. "Acme Corp".
    pub name: String,
    /// Exchange ticker, e.g. "ACME".
    pub ticker: String,
}

impl Company {
    pub fn new(name: impl Into<String>, ticker: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ticker: ticker.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// An external document returned by a fact finder or data fetcher.
///
/// Identity is the `url`, stored without surrounding whitespace. Documents are
/// never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub url: String,
    pub title: String,
    /// Leading excerpt, truncated to [`SNIPPET_MAX_CHARS`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    pub retrieved_at: NaiveDate,
}

impl Document {
    /// Build a document retrieved today.
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self::retrieved_on(url, title, chrono::Local::now().date_naive())
    }

    /// Build a document with an explicit retrieval date.
    pub fn retrieved_on(
        url: impl Into<String>,
        title: impl Into<String>,
        retrieved_at: NaiveDate,
    ) -> Self {
        let url: String = url.into();
        Self {
            url: url.trim().to_string(),
            title: title.into(),
            snippet: None,
            retrieved_at,
        }
    }

    /// Attach a snippet, truncated on a character boundary. Empty text is dropped.
    pub fn with_snippet(mut self, text: &str) -> Self {
        let trimmed = text.trim();
        self.snippet = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.chars().take(SNIPPET_MAX_CHARS).collect())
        };
        self
    }

    /// Whether this document can be cited (has a non-empty URL).
    pub fn is_citable(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

/// A document together with its stable citation number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    /// 1-based, assigned in first-seen order.
    pub number: usize,
    pub document: Document,
}

// ---------------------------------------------------------------------------
// DataKind
// ---------------------------------------------------------------------------

/// Kinds of raw structured payloads a run can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    CompanyProfile,
    FinancialMetrics,
    MarketData,
}

impl DataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CompanyProfile => "company_profile",
            Self::FinancialMetrics => "financial_metrics",
            Self::MarketData => "market_data",
        }
    }

    /// Label used when the payload is shown to the narrative generator.
    pub fn label(&self) -> &'static str {
        match self {
            Self::CompanyProfile => "Company Overview",
            Self::FinancialMetrics => "Financial Data",
            Self::MarketData => "Market Data",
        }
    }
}

impl std::fmt::Display for DataKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_is_truncated_on_char_boundary() {
        let long = "é".repeat(SNIPPET_MAX_CHARS + 50);
        let doc = Document::new("https://a", "A").with_snippet(&long);
        assert_eq!(doc.snippet.unwrap().chars().count(), SNIPPET_MAX_CHARS);
    }

    #[test]
    fn blank_snippet_is_dropped() {
        let doc = Document::new("https://a", "A").with_snippet("   ");
        assert!(doc.snippet.is_none());
    }

    #[test]
    fn empty_url_is_not_citable() {
        assert!(!Document::new("", "No link").is_citable());
        assert!(Document::new("http://a", "A").is_citable());
    }

    #[test]
    fn url_is_trimmed_on_construction() {
        let doc = Document::new("  http://a\n", "A");
        assert_eq!(doc.url, "http://a");
        assert_eq!(doc, Document::retrieved_on("http://a", "A", doc.retrieved_at));
    }

    #[test]
    fn company_deserializes_from_batch_row() {
        let json = r#"[{"name":"Acme Corp","ticker":"ACME"}]"#;
        let rows: Vec<Company> = serde_json::from_str(json).expect("parse");
        assert_eq!(rows, vec![Company::new("Acme Corp", "ACME")]);
    }

    #[test]
    fn data_kind_serializes_snake_case() {
        let json = serde_json::to_string(&DataKind::FinancialMetrics).unwrap();
        assert_eq!(json, r#""financial_metrics""#);
    }
}
