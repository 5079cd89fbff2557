//! Sequential enrichment pipeline for Shallow Dive research reports.
//!
//! A [`Pipeline`] pushes one [`Accumulator`] through a fixed list of
//! [`Stage`]s. Stages research through injected collaborators, register every
//! source they consult in the run's [`SourceRegistry`], and return narrative
//! that the runner commits under the stage's own key. The [`compiler`] turns
//! the terminal accumulator into a Markdown report.

pub mod accumulator;
pub mod batch;
pub mod catalog;
pub mod collaborators;
pub mod compiler;
pub mod output;
pub mod pipeline;
pub mod recommendation;
pub mod registry;
pub mod stage;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use accumulator::Accumulator;
pub use batch::{
    BatchEntry, CompanyRun, OutputOptions, RunStatus, analyze_company, load_companies, run_batch,
    write_summary_csv,
};
pub use catalog::{ANALYST_SYSTEM_PROMPT, standard_pipeline, standard_stages};
pub use collaborators::{
    DataFetcher, FactFinder, FetchedData, NarrativeGenerator, NoopDataFetcher, ResearchSettings,
    Toolkit,
};
pub use compiler::compile;
pub use pipeline::{
    Pipeline, PipelineBuilder, ProgressReporter, RunOutcome, RunState, SilentProgress, StageInfo,
};
pub use recommendation::{Rating, Recommendation};
pub use registry::SourceRegistry;
pub use stage::{NarrativeStage, ResearchStage, Stage, StageOutput};
