//! Stage abstraction and the two stage shapes used by the catalog.
//!
//! A stage reads the accumulator, may query the fact finder and data fetcher,
//! and returns the text for its own section. It never writes its section
//! itself: the pipeline runner commits the returned [`StageOutput`] under the
//! stage's name, which keeps section ownership one-to-one with stages.

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use shallowdive_shared::{Company, DataKind, ShallowDiveError, StageError};

use crate::accumulator::Accumulator;
use crate::collaborators::Toolkit;
use crate::recommendation::Recommendation;

/// System instructions used when a narrative stage is not given its own.
pub const DEFAULT_SYSTEM_INSTRUCTIONS: &str = "You are a careful research analyst. \
Write dense prose and cite facts with the bracketed source numbers you are given, \
for example [1] or [2][3]. Never invent a source number.";

/// Default number of research documents shown to the generator.
pub const DEFAULT_RESEARCH_WINDOW: usize = 15;

/// What a successful stage hands back to the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutput {
    /// Text stored under the stage's section key.
    pub section: String,
    /// Structured recommendation, only from the valuation stage.
    pub recommendation: Option<Recommendation>,
}

impl StageOutput {
    pub fn section(text: impl Into<String>) -> Self {
        Self {
            section: text.into(),
            recommendation: None,
        }
    }
}

/// One unit of pipeline work.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Unique name; doubles as the section key the stage owns.
    fn name(&self) -> &str;

    /// Report heading. Stages without one are not rendered by the compiler.
    fn heading(&self) -> Option<&str> {
        None
    }

    /// Report part the heading is grouped under.
    fn part(&self) -> Option<&str> {
        None
    }

    /// Whether the stage clears run state before working. Only the first
    /// stage of a pipeline may.
    fn resets_run(&self) -> bool {
        false
    }

    /// Run the stage against `acc`.
    ///
    /// Mutations applied before a failure (registered sources, research log
    /// entries, diagnostics) are kept.
    async fn execute(&self, acc: &mut Accumulator, tools: &Toolkit)
    -> Result<StageOutput, StageError>;
}

// ---------------------------------------------------------------------------
// Shared research helpers
// ---------------------------------------------------------------------------

/// Substitute `{company}` and `{ticker}` in a query template.
pub fn render_query(template: &str, company: &Company) -> String {
    template
        .replace("{company}", &company.name)
        .replace("{ticker}", &company.ticker)
}

/// Run every query concurrently, then merge results in query order so
/// citation numbers do not depend on response timing. Returns the number of
/// documents merged.
async fn research(acc: &mut Accumulator, tools: &Toolkit, queries: &[String]) -> usize {
    if queries.is_empty() {
        return 0;
    }

    let limit = tools.settings.results_per_query;
    let batches = join_all(
        queries
            .iter()
            .map(|q| tools.fact_finder.search(q, limit)),
    )
    .await;

    let mut merged = 0;
    for (query, docs) in queries.iter().zip(batches) {
        if docs.is_empty() {
            warn!(%query, "search returned no results");
            continue;
        }
        debug!(%query, results = docs.len(), "search complete");
        merged += docs.len();
        acc.ingest(&docs);
    }
    merged
}

/// Fetch one raw payload. Failures degrade to "no payload" and are noted in
/// the accumulator's error log.
async fn gather_payload(acc: &mut Accumulator, tools: &Toolkit, kind: DataKind) {
    let company = acc.company().clone();
    match tools.data.fetch(kind, &company).await {
        Ok(Some(fetched)) => {
            if let Some(source) = &fetched.source {
                acc.cite(source);
            }
            if let Err(e) = acc.record_payload(kind, fetched.payload) {
                warn!(%kind, error = %e, "payload dropped");
                acc.record_error(e.to_string());
            } else {
                info!(%kind, "raw data retrieved");
            }
        }
        Ok(None) => debug!(%kind, "no raw data available"),
        Err(e) => {
            warn!(%kind, error = %e, "raw data fetch failed, continuing without it");
            acc.record_error(format!("{kind}: {e}"));
        }
    }
}

/// Truncate to at most `max_chars` characters, marking the cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((byte_idx, _)) => format!("{} [...]", &text[..byte_idx]),
    }
}

// ---------------------------------------------------------------------------
// ResearchStage
// ---------------------------------------------------------------------------

/// Gathers raw data and search results without narration.
///
/// Its section value is a short deterministic digest of what it collected.
#[derive(Debug, Clone)]
pub struct ResearchStage {
    name: String,
    resets_run: bool,
    data_kinds: Vec<DataKind>,
    queries: Vec<String>,
}

impl ResearchStage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resets_run: false,
            data_kinds: Vec::new(),
            queries: Vec::new(),
        }
    }

    /// Clear accumulated run state before researching. The pipeline builder
    /// accepts this on the first stage only.
    pub fn resetting(mut self) -> Self {
        self.resets_run = true;
        self
    }

    pub fn fetch(mut self, kind: DataKind) -> Self {
        self.data_kinds.push(kind);
        self
    }

    pub fn query(mut self, template: impl Into<String>) -> Self {
        self.queries.push(template.into());
        self
    }
}

#[async_trait]
impl Stage for ResearchStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn resets_run(&self) -> bool {
        self.resets_run
    }

    #[instrument(skip_all, fields(stage = %self.name))]
    async fn execute(
        &self,
        acc: &mut Accumulator,
        tools: &Toolkit,
    ) -> Result<StageOutput, StageError> {
        if self.resets_run {
            acc.reset_run_state();
        }

        for kind in &self.data_kinds {
            gather_payload(acc, tools, *kind).await;
        }

        let queries: Vec<String> = self
            .queries
            .iter()
            .map(|t| render_query(t, acc.company()))
            .collect();
        let merged = research(acc, tools, &queries).await;

        let payloads: Vec<&str> = self
            .data_kinds
            .iter()
            .filter(|k| acc.payload(**k).is_some())
            .map(|k| k.as_str())
            .collect();

        info!(
            documents = merged,
            sources = acc.registry().len(),
            "research complete"
        );

        Ok(StageOutput::section(format!(
            "Collected {merged} documents from {} queries. Raw data: {}. Distinct sources so far: {}.",
            queries.len(),
            if payloads.is_empty() {
                "none".to_string()
            } else {
                payloads.join(", ")
            },
            acc.registry().len()
        )))
    }
}

// ---------------------------------------------------------------------------
// NarrativeStage
// ---------------------------------------------------------------------------

/// An earlier section quoted in the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorSection {
    pub key: String,
    pub label: String,
    /// Maximum characters quoted.
    pub budget: usize,
}

/// A raw payload quoted in the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadContext {
    pub kind: DataKind,
    /// Maximum characters of pretty-printed JSON quoted.
    pub budget: usize,
}

/// Research, assemble a bounded prompt, narrate once.
///
/// Every narrative section of the report is one of these, differing only in
/// the data it is configured with.
#[derive(Debug, Clone)]
pub struct NarrativeStage {
    key: String,
    heading: String,
    part: Option<String>,
    queries: Vec<String>,
    priors: Vec<PriorSection>,
    payloads: Vec<PayloadContext>,
    research_window: usize,
    system: String,
    instructions: String,
    extracts_recommendation: bool,
}

impl NarrativeStage {
    pub fn new(key: impl Into<String>, heading: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            heading: heading.into(),
            part: None,
            queries: Vec::new(),
            priors: Vec::new(),
            payloads: Vec::new(),
            research_window: DEFAULT_RESEARCH_WINDOW,
            system: DEFAULT_SYSTEM_INSTRUCTIONS.to_string(),
            instructions: String::new(),
            extracts_recommendation: false,
        }
    }

    pub fn in_part(mut self, part: impl Into<String>) -> Self {
        self.part = Some(part.into());
        self
    }

    pub fn query(mut self, template: impl Into<String>) -> Self {
        self.queries.push(template.into());
        self
    }

    pub fn prior(mut self, key: impl Into<String>, label: impl Into<String>, budget: usize) -> Self {
        self.priors.push(PriorSection {
            key: key.into(),
            label: label.into(),
            budget,
        });
        self
    }

    pub fn payload(mut self, kind: DataKind, budget: usize) -> Self {
        self.payloads.push(PayloadContext { kind, budget });
        self
    }

    pub fn research_window(mut self, window: usize) -> Self {
        self.research_window = window;
        self
    }

    pub fn system(mut self, text: impl Into<String>) -> Self {
        self.system = text.into();
        self
    }

    pub fn instructions(mut self, text: impl Into<String>) -> Self {
        self.instructions = text.into();
        self
    }

    /// Parse a [`Recommendation`] out of the generated text.
    pub fn extracts_recommendation(mut self) -> Self {
        self.extracts_recommendation = true;
        self
    }

    pub fn priors(&self) -> &[PriorSection] {
        &self.priors
    }

    /// Build the prompt from the current accumulator contents.
    ///
    /// Deterministic for a given accumulator.
    pub fn build_prompt(&self, acc: &Accumulator) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Company: {} ({})\n",
            acc.company_name(),
            acc.ticker()
        ));

        let priors: Vec<String> = self
            .priors
            .iter()
            .filter_map(|p| {
                acc.section(&p.key)
                    .map(|text| format!("{}: {}", p.label, truncate_chars(text, p.budget)))
            })
            .collect();
        if !priors.is_empty() {
            out.push_str("\nPrevious Analysis:\n");
            out.push_str(&priors.join("\n\n"));
            out.push('\n');
        }

        for ctx in &self.payloads {
            let Some(value) = acc.payload(ctx.kind) else {
                continue;
            };
            let pretty = serde_json::to_string_pretty(value).unwrap_or_default();
            out.push_str(&format!(
                "\n{} (from API):\n{}\n",
                ctx.kind.label(),
                truncate_chars(&pretty, ctx.budget)
            ));
        }

        let research = self.research_context(acc);
        if !research.is_empty() {
            out.push_str("\nWeb Research with Citations:\n");
            out.push_str(&research.join("\n"));
            out.push_str(
                "\n\nIMPORTANT: Use the citation numbers [X] provided above when referencing \
                 these sources. Place citations at the end of claims, before the period. \
                 Only use citation numbers that appear above.\n",
            );
        }

        out.push_str(&format!("\nWrite {}.\n", self.heading));
        if !self.instructions.is_empty() {
            out.push('\n');
            out.push_str(self.instructions.trim());
            out.push('\n');
        }
        out
    }

    /// Most recent research first, one line block per distinct cited URL.
    fn research_context(&self, acc: &Accumulator) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        acc.research_log()
            .iter()
            .rev()
            .filter_map(|doc| {
                let number = acc.registry().number_of(&doc.url)?;
                seen.insert(number).then(|| {
                    format!(
                        "{} [{number}]:\n{}",
                        doc.title,
                        doc.snippet.as_deref().unwrap_or("")
                    )
                })
            })
            .take(self.research_window)
            .collect()
    }
}

#[async_trait]
impl Stage for NarrativeStage {
    fn name(&self) -> &str {
        &self.key
    }

    fn heading(&self) -> Option<&str> {
        Some(&self.heading)
    }

    fn part(&self) -> Option<&str> {
        self.part.as_deref()
    }

    #[instrument(skip_all, fields(stage = %self.key))]
    async fn execute(
        &self,
        acc: &mut Accumulator,
        tools: &Toolkit,
    ) -> Result<StageOutput, StageError> {
        let queries: Vec<String> = self
            .queries
            .iter()
            .map(|t| render_query(t, acc.company()))
            .collect();
        research(acc, tools, &queries).await;

        let prompt = self.build_prompt(acc);
        debug!(prompt_chars = prompt.len(), "prompt assembled");

        let text = tools
            .narrator
            .generate(&self.system, &prompt)
            .await
            .map_err(|e| StageError::new(&self.key, e))?;

        if text.trim().is_empty() {
            return Err(StageError::new(
                &self.key,
                ShallowDiveError::Generation("generator returned empty text".into()),
            ));
        }

        let recommendation = self
            .extracts_recommendation
            .then(|| Recommendation::extract(&text));

        info!(chars = text.len(), sources = acc.registry().len(), "section generated");

        Ok(StageOutput {
            section: text,
            recommendation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CannedFactFinder, CannedNarrator, FailingNarrator, toolkit};
    use shallowdive_shared::Document;
    use std::sync::Arc;

    fn acme() -> Accumulator {
        Accumulator::new(Company::new("Acme Corp", "ACME"))
    }

    #[test]
    fn render_query_substitutes_identity() {
        let q = render_query("{company} {ticker} peers", &Company::new("Acme Corp", "ACME"));
        assert_eq!(q, "Acme Corp ACME peers");
    }

    #[test]
    fn truncate_chars_marks_cut() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdef", 3), "abc [...]");
        assert_eq!(truncate_chars("ééé", 2), "éé [...]");
    }

    #[test]
    fn prompt_quotes_prior_sections_with_budget() {
        let stage = NarrativeStage::new("s2", "Section Two").prior("s1", "Section One", 5);
        let mut acc = acme();
        acc.commit_section("s1", "0123456789".into()).unwrap();

        let prompt = stage.build_prompt(&acc);
        assert!(prompt.contains("Section One: 01234 [...]"));
        assert!(prompt.contains("Write Section Two."));
    }

    #[test]
    fn prompt_window_is_recent_first_and_deduplicated() {
        let stage = NarrativeStage::new("s", "S").research_window(2);
        let mut acc = acme();
        acc.ingest(&[
            Document::new("http://a", "A").with_snippet("alpha"),
            Document::new("http://b", "B").with_snippet("beta"),
            Document::new("http://c", "C").with_snippet("gamma"),
            Document::new("http://c", "C").with_snippet("gamma"),
        ]);

        let prompt = stage.build_prompt(&acc);
        let c = prompt.find("C [3]").expect("C cited");
        let b = prompt.find("B [2]").expect("B cited");
        assert!(c < b);
        assert!(!prompt.contains("A [1]"));
        assert_eq!(prompt.matches("C [3]").count(), 1);
    }

    #[tokio::test]
    async fn narrative_stage_registers_sources_and_returns_text() {
        let tools = toolkit(
            CannedFactFinder::single("http://a", "A"),
            CannedNarrator::new("text cites [1]"),
        );
        let stage = NarrativeStage::new("s1", "Section One").query("{company} overview");
        let mut acc = acme();

        let output = stage.execute(&mut acc, &tools).await.unwrap();

        assert_eq!(output.section, "text cites [1]");
        assert!(output.recommendation.is_none());
        assert_eq!(acc.registry().len(), 1);
        // The runner, not the stage, commits the section
        assert!(acc.section("s1").is_none());
    }

    #[tokio::test]
    async fn generation_failure_keeps_registered_sources() {
        let tools = toolkit(
            CannedFactFinder::single("http://a", "A"),
            FailingNarrator::always(),
        );
        let stage = NarrativeStage::new("s1", "Section One").query("{company} overview");
        let mut acc = acme();

        let err = stage.execute(&mut acc, &tools).await.unwrap_err();

        assert_eq!(err.stage, "s1");
        assert!(matches!(*err.cause, ShallowDiveError::Generation(_)));
        assert_eq!(acc.registry().len(), 1);
    }

    #[tokio::test]
    async fn empty_generation_is_a_failure() {
        let tools = toolkit(CannedFactFinder::empty(), CannedNarrator::new("   "));
        let stage = NarrativeStage::new("s1", "Section One");
        let mut acc = acme();

        assert!(stage.execute(&mut acc, &tools).await.is_err());
    }

    #[tokio::test]
    async fn valuation_stage_extracts_recommendation() {
        let tools = toolkit(
            CannedFactFinder::empty(),
            CannedNarrator::new("Base Target: $120\nUpside: +20%\n**RATING: HOLD**"),
        );
        let stage = NarrativeStage::new("section_6_3", "Price Target").extracts_recommendation();
        let mut acc = acme();

        let output = stage.execute(&mut acc, &tools).await.unwrap();
        let rec = output.recommendation.expect("recommendation");
        assert_eq!(rec.rating_label(), "HOLD");
        assert_eq!(rec.target_label(), "$120");
    }

    #[tokio::test]
    async fn research_stage_resets_and_summarizes() {
        let tools = toolkit(
            CannedFactFinder::single("http://a", "A"),
            CannedNarrator::new("unused"),
        );
        let stage = ResearchStage::new("initialize")
            .resetting()
            .query("{company} business model")
            .query("{company} margins");
        let mut acc = acme();
        acc.record_error("stale");

        let output = stage.execute(&mut acc, &tools).await.unwrap();

        assert!(acc.errors().is_empty());
        assert_eq!(acc.research_log().len(), 2);
        assert_eq!(acc.registry().len(), 1);
        assert_eq!(
            output.section,
            "Collected 2 documents from 2 queries. Raw data: none. Distinct sources so far: 1."
        );
    }

    #[tokio::test]
    async fn research_stage_survives_fetch_errors() {
        let tools = toolkit(CannedFactFinder::empty(), CannedNarrator::new("unused"))
            .with_data_fetcher(Arc::new(crate::testing::FailingDataFetcher));
        let stage = ResearchStage::new("gather_financials").fetch(DataKind::FinancialMetrics);
        let mut acc = acme();

        let output = stage.execute(&mut acc, &tools).await;

        assert!(output.is_ok());
        assert_eq!(acc.errors().len(), 1);
        assert!(acc.payload(DataKind::FinancialMetrics).is_none());
    }
}
