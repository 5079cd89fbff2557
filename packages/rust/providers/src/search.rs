//! Tavily web search.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use shallowdive_core::FactFinder;
use shallowdive_shared::{Document, Result, ShallowDiveError};

const UNTITLED: &str = "Untitled";

#[derive(Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

impl SearchHit {
    fn into_document(self) -> Document {
        let title = self
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());
        let doc = Document::new(self.url.trim(), title);
        match self.content {
            Some(content) => doc.with_snippet(&content),
            None => doc,
        }
    }
}

/// Fact finder backed by the Tavily search API.
pub struct TavilySearch {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl TavilySearch {
    pub fn new(base_url: &str, api_key: String, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: super::build_client(timeout_secs)?,
            endpoint: format!("{}/search", super::base_url(base_url)?),
            api_key,
        })
    }

    async fn try_search(&self, query: &str, limit: usize) -> Result<Vec<Document>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SearchRequest {
                api_key: &self.api_key,
                query,
                max_results: limit,
            })
            .send()
            .await
            .map_err(|e| ShallowDiveError::Network(format!("search: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ShallowDiveError::Network(format!("search: HTTP {status}")));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| ShallowDiveError::parse(format!("search response: {e}")))?;

        Ok(body
            .results
            .into_iter()
            .take(limit)
            .map(SearchHit::into_document)
            .collect())
    }
}

#[async_trait]
impl FactFinder for TavilySearch {
    #[instrument(skip(self))]
    async fn search(&self, query: &str, limit: usize) -> Vec<Document> {
        match self.try_search(query, limit).await {
            Ok(docs) => {
                debug!(results = docs.len(), "search ok");
                docs
            }
            Err(e) => {
                warn!(error = %e, "search failed, treating as no results");
                Vec::new()
            }
        }
    }
}
