//! Collaborator interfaces consumed by the pipeline.
//!
//! The pipeline never talks to a search engine, model provider, or data
//! vendor directly. Implementations are injected through [`Toolkit`] when a
//! pipeline is built, so concurrent runs share nothing but these handles.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use shallowdive_shared::{Company, DataKind, Document, Result};

/// Retrieves candidate documents for a query.
///
/// Implementations swallow their own failures: any error becomes an empty list.
#[async_trait]
pub trait FactFinder: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Vec<Document>;
}

/// Turns a prompt into prose.
///
/// Failures are reported as `ShallowDiveError::Generation` and abort the stage.
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    async fn generate(&self, system_instructions: &str, prompt: &str) -> Result<String>;
}

/// A raw payload plus the document it can be cited as.
#[derive(Debug, Clone)]
pub struct FetchedData {
    pub payload: Value,
    pub source: Option<Document>,
}

/// Best-effort fetcher for structured company data.
///
/// `Ok(None)` means "nothing available". Errors are `ShallowDiveError::Fetch`
/// and are always recovered by the caller.
#[async_trait]
pub trait DataFetcher: Send + Sync {
    async fn fetch(&self, kind: DataKind, company: &Company) -> Result<Option<FetchedData>>;
}

/// Data fetcher used when no vendor is configured.
pub struct NoopDataFetcher;

#[async_trait]
impl DataFetcher for NoopDataFetcher {
    async fn fetch(&self, _kind: DataKind, _company: &Company) -> Result<Option<FetchedData>> {
        Ok(None)
    }
}

/// Tunables shared by every stage in a pipeline.
#[derive(Debug, Clone)]
pub struct ResearchSettings {
    /// Results requested per search query.
    pub results_per_query: usize,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            results_per_query: 5,
        }
    }
}

/// Everything a stage may call out to.
#[derive(Clone)]
pub struct Toolkit {
    pub fact_finder: Arc<dyn FactFinder>,
    pub narrator: Arc<dyn NarrativeGenerator>,
    pub data: Arc<dyn DataFetcher>,
    pub settings: ResearchSettings,
}

impl Toolkit {
    /// Toolkit without raw-data access.
    pub fn new(fact_finder: Arc<dyn FactFinder>, narrator: Arc<dyn NarrativeGenerator>) -> Self {
        Self {
            fact_finder,
            narrator,
            data: Arc::new(NoopDataFetcher),
            settings: ResearchSettings::default(),
        }
    }

    pub fn with_data_fetcher(mut self, data: Arc<dyn DataFetcher>) -> Self {
        self.data = data;
        self
    }

    pub fn with_settings(mut self, settings: ResearchSettings) -> Self {
        self.settings = settings;
        self
    }
}
