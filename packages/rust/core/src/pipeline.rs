//! Pipeline runner: one pass over a fixed stage list.

use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, error, info, instrument};

use shallowdive_shared::{Company, Result, ShallowDiveError, StageError};

use crate::accumulator::Accumulator;
use crate::collaborators::Toolkit;
use crate::stage::{Stage, StageOutput};

/// Runner state. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Running(usize),
    Completed,
    Failed,
}

/// Terminal result of one run. Both variants carry the accumulator.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(Accumulator),
    Failed {
        accumulator: Accumulator,
        error: StageError,
    },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn state(&self) -> RunState {
        match self {
            Self::Completed(_) => RunState::Completed,
            Self::Failed { .. } => RunState::Failed,
        }
    }

    pub fn accumulator(&self) -> &Accumulator {
        match self {
            Self::Completed(acc) => acc,
            Self::Failed { accumulator, .. } => accumulator,
        }
    }

    pub fn into_accumulator(self) -> Accumulator {
        match self {
            Self::Completed(acc) => acc,
            Self::Failed { accumulator, .. } => accumulator,
        }
    }

    pub fn error(&self) -> Option<&StageError> {
        match self {
            Self::Completed(_) => None,
            Self::Failed { error, .. } => Some(error),
        }
    }
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called on every runner state transition, starting with `Pending`.
    fn state_changed(&self, _company: &Company, _state: RunState) {}
    /// Called once before the first stage.
    fn run_started(&self, company: &Company, total_stages: usize);
    /// Called before a stage executes. `index` is zero-based.
    fn stage_started(&self, company: &Company, index: usize, total: usize, name: &str);
    /// Called after a stage's output is committed.
    fn stage_finished(&self, company: &Company, index: usize, total: usize, name: &str);
    /// Called once with the terminal state.
    fn run_finished(&self, company: &Company, outcome: &RunOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn run_started(&self, _company: &Company, _total_stages: usize) {}
    fn stage_started(&self, _company: &Company, _index: usize, _total: usize, _name: &str) {}
    fn stage_finished(&self, _company: &Company, _index: usize, _total: usize, _name: &str) {}
    fn run_finished(&self, _company: &Company, _outcome: &RunOutcome) {}
}

/// Name, heading and part of one stage, in pipeline order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInfo {
    pub name: String,
    pub heading: Option<String>,
    pub part: Option<String>,
}

/// An ordered, immutable list of stages plus the collaborators they use.
///
/// A pipeline holds no per-run state, so one instance can drive any number
/// of concurrent runs.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    tools: Toolkit,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field(
                "stages",
                &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn builder(tools: Toolkit) -> PipelineBuilder {
        PipelineBuilder {
            stages: Vec::new(),
            tools,
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn tools(&self) -> &Toolkit {
        &self.tools
    }

    /// Stage order with headings, as consumed by the report compiler.
    pub fn outline(&self) -> Vec<StageInfo> {
        self.stages
            .iter()
            .map(|s| StageInfo {
                name: s.name().to_string(),
                heading: s.heading().map(str::to_string),
                part: s.part().map(str::to_string),
            })
            .collect()
    }

    /// Run every stage against a fresh accumulator for `company`.
    pub async fn run(&self, company: Company, progress: &dyn ProgressReporter) -> RunOutcome {
        self.run_with(Accumulator::new(company), progress).await
    }

    /// Run every stage, in order, against `acc`.
    ///
    /// Stops at the first failing stage. Nothing after it executes, and the
    /// accumulator is returned as the failing stage left it.
    #[instrument(skip_all, fields(ticker = %acc.ticker(), run_id = %acc.run_id()))]
    pub async fn run_with(
        &self,
        mut acc: Accumulator,
        progress: &dyn ProgressReporter,
    ) -> RunOutcome {
        let start = Instant::now();
        let total = self.stages.len();
        let company = acc.company().clone();
        let enter = |state: RunState| {
            debug!(?state, "state transition");
            progress.state_changed(&company, state);
        };

        enter(RunState::Pending);
        progress.run_started(&company, total);
        info!(company = %company.name, stages = total, "run started");

        for (index, stage) in self.stages.iter().enumerate() {
            enter(RunState::Running(index));
            progress.stage_started(&company, index, total, stage.name());

            let committed = match stage.execute(&mut acc, &self.tools).await {
                Ok(output) => commit(&mut acc, stage.name(), output),
                Err(e) => Err(e),
            };

            if let Err(error) = committed {
                enter(RunState::Failed);
                error!(stage = %error.stage, cause = %error.cause, "run failed");
                acc.record_error(error.to_string());
                let outcome = RunOutcome::Failed {
                    accumulator: acc,
                    error,
                };
                progress.run_finished(&company, &outcome);
                return outcome;
            }

            progress.stage_finished(&company, index, total, stage.name());
        }

        enter(RunState::Completed);
        info!(
            sections = acc.sections().len(),
            sources = acc.registry().len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "run completed"
        );
        let outcome = RunOutcome::Completed(acc);
        progress.run_finished(&company, &outcome);
        outcome
    }
}

/// Write a stage's output under its own key and mark it completed.
///
/// A write-once violation fails the stage and leaves its section unset.
fn commit(
    acc: &mut Accumulator,
    stage: &str,
    output: StageOutput,
) -> std::result::Result<(), StageError> {
    acc.commit_stage(stage, output.section, output.recommendation)
        .map_err(|e| StageError::new(stage, e))
}

/// Builder for [`Pipeline`]. Order of `stage` calls is execution order.
pub struct PipelineBuilder {
    stages: Vec<Box<dyn Stage>>,
    tools: Toolkit,
}

impl PipelineBuilder {
    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn boxed_stage(mut self, stage: Box<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Validate and build. Stage names must be non-empty and unique, since
    /// each name is the section key its stage owns. Only the first stage may
    /// reset run state.
    pub fn build(self) -> Result<Pipeline> {
        if self.stages.is_empty() {
            return Err(ShallowDiveError::validation("pipeline has no stages"));
        }

        let mut seen = HashSet::new();
        for (index, stage) in self.stages.iter().enumerate() {
            let name = stage.name();
            if index > 0 && stage.resets_run() {
                return Err(ShallowDiveError::validation(format!(
                    "stage '{name}' resets run state but is not the first stage"
                )));
            }
            if name.trim().is_empty() {
                return Err(ShallowDiveError::validation("stage name must not be empty"));
            }
            if !seen.insert(name) {
                return Err(ShallowDiveError::validation(format!(
                    "duplicate stage name '{name}'"
                )));
            }
        }

        Ok(Pipeline {
            stages: self.stages,
            tools: self.tools,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{NarrativeStage, ResearchStage};
    use crate::testing::{CannedFactFinder, CannedNarrator, CountingStage, FailingStage, toolkit};
    use std::sync::Mutex;
    use std::sync::atomic::Ordering;

    fn tools() -> Toolkit {
        toolkit(CannedFactFinder::empty(), CannedNarrator::new("unused"))
    }

    fn acme() -> Company {
        Company::new("Acme Corp", "ACME")
    }

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn state_changed(&self, _company: &Company, state: RunState) {
            self.events.lock().unwrap().push(format!("{state:?}"));
        }
        fn run_started(&self, _company: &Company, total: usize) {
            self.events.lock().unwrap().push(format!("start/{total}"));
        }
        fn stage_started(&self, _company: &Company, index: usize, _total: usize, name: &str) {
            self.events.lock().unwrap().push(format!("begin {index} {name}"));
        }
        fn stage_finished(&self, _company: &Company, index: usize, _total: usize, name: &str) {
            self.events.lock().unwrap().push(format!("end {index} {name}"));
        }
        fn run_finished(&self, _company: &Company, outcome: &RunOutcome) {
            self.events
                .lock()
                .unwrap()
                .push(format!("finish {:?}", outcome.state()));
        }
    }

    #[tokio::test]
    async fn completed_run_commits_every_stage_in_order() {
        let pipeline = Pipeline::builder(tools())
            .stage(CountingStage::new("a", "first"))
            .stage(CountingStage::new("b", "second"))
            .build()
            .unwrap();

        let outcome = pipeline.run(acme(), &SilentProgress).await;

        assert_eq!(outcome.state(), RunState::Completed);
        let acc = outcome.accumulator();
        assert_eq!(acc.completed(), ["a", "b"]);
        assert_eq!(acc.section("a"), Some("first"));
        assert_eq!(acc.section("b"), Some("second"));
    }

    #[tokio::test]
    async fn failure_stops_the_run() {
        let failing = FailingStage::new("b");
        let after = CountingStage::new("c", "never");
        let after_calls = after.counter();

        let pipeline = Pipeline::builder(tools())
            .stage(CountingStage::new("a", "first"))
            .stage(failing)
            .stage(after)
            .build()
            .unwrap();

        let outcome = pipeline.run(acme(), &SilentProgress).await;

        assert_eq!(outcome.state(), RunState::Failed);
        assert_eq!(outcome.error().unwrap().stage, "b");
        let acc = outcome.accumulator();
        assert_eq!(acc.completed(), ["a"]);
        assert!(acc.section("b").is_none());
        assert_eq!(acc.errors().len(), 2);
        assert_eq!(after_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn progress_sees_each_transition() {
        let pipeline = Pipeline::builder(tools())
            .stage(CountingStage::new("a", "x"))
            .stage(FailingStage::new("b"))
            .build()
            .unwrap();
        let progress = RecordingProgress::default();

        pipeline.run(acme(), &progress).await;

        assert_eq!(
            *progress.events.lock().unwrap(),
            vec![
                "Pending",
                "start/2",
                "Running(0)",
                "begin 0 a",
                "end 0 a",
                "Running(1)",
                "begin 1 b",
                "Failed",
                "finish Failed"
            ]
        );
    }

    #[test]
    fn builder_rejects_duplicate_names() {
        let err = Pipeline::builder(tools())
            .stage(CountingStage::new("a", "x"))
            .stage(CountingStage::new("a", "y"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate stage name 'a'"));
    }

    #[tokio::test]
    async fn completed_run_reports_completed_state_last() {
        let pipeline = Pipeline::builder(tools())
            .stage(CountingStage::new("a", "x"))
            .build()
            .unwrap();
        let progress = RecordingProgress::default();

        pipeline.run(acme(), &progress).await;

        let events = progress.events.lock().unwrap();
        assert_eq!(events[events.len() - 2], "Completed");
        assert_eq!(events[events.len() - 1], "finish Completed");
    }

    #[test]
    fn builder_rejects_reset_after_first_stage() {
        let err = Pipeline::builder(tools())
            .stage(CountingStage::new("a", "x"))
            .stage(CountingStage::new("b", "y"))
            .stage(ResearchStage::new("late_init").resetting())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("'late_init' resets run state"));
    }

    #[test]
    fn builder_accepts_reset_as_first_stage() {
        let pipeline = Pipeline::builder(tools())
            .stage(ResearchStage::new("initialize").resetting())
            .stage(CountingStage::new("a", "x"))
            .build();
        assert!(pipeline.is_ok());
    }

    #[tokio::test]
    async fn second_recommendation_fails_without_writing_its_section() {
        let tools = toolkit(CannedFactFinder::empty(), CannedNarrator::new("RATING: BUY"));
        let pipeline = Pipeline::builder(tools)
            .stage(NarrativeStage::new("v1", "First Valuation").extracts_recommendation())
            .stage(NarrativeStage::new("v2", "Second Valuation").extracts_recommendation())
            .build()
            .unwrap();

        let outcome = pipeline.run(acme(), &SilentProgress).await;

        assert_eq!(outcome.state(), RunState::Failed);
        assert_eq!(outcome.error().unwrap().stage, "v2");
        let acc = outcome.accumulator();
        assert_eq!(acc.completed(), ["v1"]);
        assert!(acc.section("v2").is_none());
        assert_eq!(acc.recommendation().rating_label(), "BUY");
    }

    #[test]
    fn builder_rejects_empty_pipeline() {
        assert!(Pipeline::builder(tools()).build().is_err());
    }

    #[test]
    fn outline_follows_stage_order() {
        let pipeline = Pipeline::builder(tools())
            .stage(CountingStage::new("a", "x"))
            .stage(CountingStage::new("b", "y"))
            .build()
            .unwrap();

        let names: Vec<String> = pipeline.outline().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
