//! The shared state threaded through every stage of a run.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use shallowdive_shared::{Company, DataKind, Document, Result, RunId, ShallowDiveError};

use crate::recommendation::Recommendation;
use crate::registry::SourceRegistry;

/// Mutable record for one research run.
///
/// Identity fields are fixed at construction. Collections only grow, except
/// through a reset by the first stage of a pipeline, which the builder
/// enforces. Section text and the recommendation are
/// committed by the pipeline runner on behalf of the owning stage and can be
/// written once per key.
#[derive(Debug, Clone, Serialize)]
pub struct Accumulator {
    run_id: RunId,
    company: Company,
    payloads: BTreeMap<DataKind, Value>,
    research_log: Vec<Document>,
    registry: SourceRegistry,
    sections: BTreeMap<String, String>,
    completed: Vec<String>,
    errors: Vec<String>,
    recommendation: Option<Recommendation>,
}

impl Accumulator {
    pub fn new(company: Company) -> Self {
        Self {
            run_id: RunId::new(),
            company,
            payloads: BTreeMap::new(),
            research_log: Vec::new(),
            registry: SourceRegistry::new(),
            sections: BTreeMap::new(),
            completed: Vec::new(),
            errors: Vec::new(),
            recommendation: None,
        }
    }

    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn company(&self) -> &Company {
        &self.company
    }

    pub fn company_name(&self) -> &str {
        &self.company.name
    }

    pub fn ticker(&self) -> &str {
        &self.company.ticker
    }

    // -----------------------------------------------------------------------
    // Research
    // -----------------------------------------------------------------------

    /// Clear everything a previous run could have left behind.
    pub(crate) fn reset_run_state(&mut self) {
        self.payloads.clear();
        self.research_log.clear();
        self.registry = SourceRegistry::new();
        self.sections.clear();
        self.completed.clear();
        self.errors.clear();
        self.recommendation = None;
    }

    /// Store a raw payload. Each kind may be written once per run.
    pub fn record_payload(&mut self, kind: DataKind, payload: Value) -> Result<()> {
        if self.payloads.contains_key(&kind) {
            return Err(ShallowDiveError::validation(format!(
                "payload '{kind}' already recorded for this run"
            )));
        }
        self.payloads.insert(kind, payload);
        Ok(())
    }

    pub fn payload(&self, kind: DataKind) -> Option<&Value> {
        self.payloads.get(&kind)
    }

    /// Merge search results: citable documents are registered, and every
    /// document is appended to the research log in the given order.
    pub fn ingest(&mut self, documents: &[Document]) {
        for doc in documents {
            if doc.is_citable() {
                self.registry.register(doc);
            }
        }
        self.research_log.extend_from_slice(documents);
    }

    /// Register a single source without adding it to the research log.
    pub fn cite(&mut self, document: &Document) -> Option<usize> {
        document
            .is_citable()
            .then(|| self.registry.register(document))
    }

    pub fn research_log(&self) -> &[Document] {
        &self.research_log
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    // -----------------------------------------------------------------------
    // Narrative and bookkeeping
    // -----------------------------------------------------------------------

    pub fn sections(&self) -> &BTreeMap<String, String> {
        &self.sections
    }

    pub fn section(&self, key: &str) -> Option<&str> {
        self.sections.get(key).map(String::as_str)
    }

    /// Stage names in the order they completed.
    pub fn completed(&self) -> &[String] {
        &self.completed
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Append a diagnostic. Only a run reset clears these.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// The committed recommendation, or an all-undetermined one.
    pub fn recommendation(&self) -> Recommendation {
        self.recommendation.clone().unwrap_or_default()
    }

    pub(crate) fn commit_section(&mut self, key: &str, text: String) -> Result<()> {
        if self.sections.contains_key(key) {
            return Err(ShallowDiveError::validation(format!(
                "section '{key}' already written in this run"
            )));
        }
        self.sections.insert(key.to_string(), text);
        Ok(())
    }

    pub(crate) fn commit_recommendation(&mut self, recommendation: Recommendation) -> Result<()> {
        if self.recommendation.is_some() {
            return Err(ShallowDiveError::validation(
                "recommendation already written in this run",
            ));
        }
        self.recommendation = Some(recommendation);
        Ok(())
    }

    pub(crate) fn mark_completed(&mut self, stage: &str) {
        self.completed.push(stage.to_string());
    }

    /// Commit a stage's section, its recommendation if any, and its
    /// completion marker. Either all three are written or none is.
    pub(crate) fn commit_stage(
        &mut self,
        stage: &str,
        section: String,
        recommendation: Option<Recommendation>,
    ) -> Result<()> {
        if self.sections.contains_key(stage) {
            return Err(ShallowDiveError::validation(format!(
                "section '{stage}' already written in this run"
            )));
        }
        if recommendation.is_some() && self.recommendation.is_some() {
            return Err(ShallowDiveError::validation(
                "recommendation already written in this run",
            ));
        }

        self.commit_section(stage, section)?;
        if let Some(rec) = recommendation {
            self.commit_recommendation(rec)?;
        }
        self.mark_completed(stage);
        Ok(())
    }
}
