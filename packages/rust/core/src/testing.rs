//! Canned collaborators and spy stages for tests.
//!
//! Compiled for this crate's unit tests and, through the `test-support`
//! feature, for integration tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use shallowdive_shared::{Company, DataKind, Document, Result, ShallowDiveError, StageError};

use crate::accumulator::Accumulator;
use crate::collaborators::{DataFetcher, FactFinder, FetchedData, NarrativeGenerator, Toolkit};
use crate::stage::{Stage, StageOutput};

/// Toolkit around the given stubs with default settings.
pub fn toolkit(
    fact_finder: impl FactFinder + 'static,
    narrator: impl NarrativeGenerator + 'static,
) -> Toolkit {
    Toolkit::new(Arc::new(fact_finder), Arc::new(narrator))
}

// ---------------------------------------------------------------------------
// Fact finders
// ---------------------------------------------------------------------------

/// Returns the same documents for every query.
#[derive(Debug, Default)]
pub struct CannedFactFinder {
    documents: Vec<Document>,
    calls: AtomicUsize,
}

impl CannedFactFinder {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn single(url: &str, title: &str) -> Self {
        Self::new(vec![Document::new(url, title)])
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FactFinder for CannedFactFinder {
    async fn search(&self, _query: &str, limit: usize) -> Vec<Document> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.documents.iter().take(limit).cloned().collect()
    }
}

/// Returns one document per query, with the URL derived from the query text.
#[derive(Debug, Default)]
pub struct EchoFactFinder;

#[async_trait]
impl FactFinder for EchoFactFinder {
    async fn search(&self, query: &str, _limit: usize) -> Vec<Document> {
        let slug = query.to_lowercase().replace(' ', "-");
        vec![Document::new(format!("http://search/{slug}"), query).with_snippet(query)]
    }
}

// ---------------------------------------------------------------------------
// Narrators
// ---------------------------------------------------------------------------

/// Returns the same text for every prompt.
#[derive(Debug)]
pub struct CannedNarrator {
    text: String,
    calls: AtomicUsize,
}

impl CannedNarrator {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NarrativeGenerator for CannedNarrator {
    async fn generate(&self, _system_instructions: &str, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }
}

/// Fails whenever the prompt contains every configured marker, otherwise
/// answers with canned text. No markers means fail on every call.
#[derive(Debug)]
pub struct FailingNarrator {
    markers: Vec<String>,
    text: String,
}

impl FailingNarrator {
    pub fn always() -> Self {
        Self {
            markers: Vec::new(),
            text: String::new(),
        }
    }

    /// Fail only for prompts containing all of `markers`; answer `text` otherwise.
    pub fn when_prompt_contains(markers: &[&str], text: impl Into<String>) -> Self {
        Self {
            markers: markers.iter().map(|m| m.to_string()).collect(),
            text: text.into(),
        }
    }
}

#[async_trait]
impl NarrativeGenerator for FailingNarrator {
    async fn generate(&self, _system_instructions: &str, prompt: &str) -> Result<String> {
        if self.markers.iter().all(|m| prompt.contains(m.as_str())) {
            return Err(ShallowDiveError::Generation("model unavailable".into()));
        }
        Ok(self.text.clone())
    }
}

// ---------------------------------------------------------------------------
// Data fetchers
// ---------------------------------------------------------------------------

/// Always fails with a fetch error.
pub struct FailingDataFetcher;

#[async_trait]
impl DataFetcher for FailingDataFetcher {
    async fn fetch(&self, kind: DataKind, _company: &Company) -> Result<Option<FetchedData>> {
        Err(ShallowDiveError::Fetch(format!("{kind} endpoint unreachable")))
    }
}

/// Returns the same payload for every kind, cited as a vendor page.
pub struct CannedDataFetcher {
    payload: Value,
}

impl CannedDataFetcher {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }
}

#[async_trait]
impl DataFetcher for CannedDataFetcher {
    async fn fetch(&self, kind: DataKind, company: &Company) -> Result<Option<FetchedData>> {
        Ok(Some(FetchedData {
            payload: self.payload.clone(),
            source: Some(Document::new(
                format!("http://data/{}/{}", kind.as_str(), company.ticker),
                format!("{} {}", company.ticker, kind.label()),
            )),
        }))
    }
}

// ---------------------------------------------------------------------------
// Spy stages
// ---------------------------------------------------------------------------

/// Returns fixed text and counts how often it ran.
pub struct CountingStage {
    name: String,
    text: String,
    calls: Arc<AtomicUsize>,
}

impl CountingStage {
    pub fn new(name: &str, text: &str) -> Self {
        Self {
            name: name.to_string(),
            text: text.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared call counter; clone it before moving the stage into a pipeline.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Stage for CountingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn heading(&self) -> Option<&str> {
        Some(&self.name)
    }

    async fn execute(
        &self,
        _acc: &mut Accumulator,
        _tools: &Toolkit,
    ) -> std::result::Result<StageOutput, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(StageOutput::section(self.text.clone()))
    }
}

/// Records a diagnostic and then fails with a generation error.
pub struct FailingStage {
    name: String,
    calls: Arc<AtomicUsize>,
}

impl FailingStage {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn heading(&self) -> Option<&str> {
        Some(&self.name)
    }

    async fn execute(
        &self,
        acc: &mut Accumulator,
        _tools: &Toolkit,
    ) -> std::result::Result<StageOutput, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        acc.record_error(format!("{} saw a bad response", self.name));
        Err(StageError::new(
            &self.name,
            ShallowDiveError::Generation("model unavailable".into()),
        ))
    }
}
