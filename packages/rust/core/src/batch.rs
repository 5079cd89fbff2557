//! Single-company and batch drivers.
//!
//! Each company gets its own accumulator. Runs share only the pipeline, which
//! is immutable, so a failure in one run cannot touch another.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use shallowdive_shared::{Company, Result, ShallowDiveError};

use crate::compiler;
use crate::output::{report_file_name, write_atomically};
use crate::pipeline::{Pipeline, ProgressReporter, RunOutcome};

/// Final status of one company run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Success,
    Failed,
}

/// One row of the batch summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchEntry {
    pub company: String,
    pub ticker: String,
    pub status: RunStatus,
    pub failed_stage: Option<String>,
    pub error: Option<String>,
    /// Distinct sources in the run's registry.
    pub sources: usize,
    /// Rendered sections that were completed.
    pub sections: usize,
    pub report_path: Option<String>,
}

/// Where and how reports are written.
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub output_dir: PathBuf,
    /// Also write reports for failed runs, marked `_partial`.
    pub write_partial: bool,
    /// Date stamped into file names and report footers.
    pub report_date: NaiveDate,
}

/// Everything a single run produced.
#[derive(Debug)]
pub struct CompanyRun {
    pub entry: BatchEntry,
    pub outcome: RunOutcome,
}

/// Run the pipeline for one company and write its report.
#[instrument(skip_all, fields(ticker = %company.ticker))]
pub async fn analyze_company(
    pipeline: &Pipeline,
    company: Company,
    options: &OutputOptions,
    progress: &dyn ProgressReporter,
) -> CompanyRun {
    let outline = pipeline.outline();
    let outcome = pipeline.run(company.clone(), progress).await;
    let acc = outcome.accumulator();

    let sections = outline
        .iter()
        .filter(|s| s.heading.is_some() && acc.completed().contains(&s.name))
        .count();

    let mut entry = BatchEntry {
        company: company.name.clone(),
        ticker: company.ticker.clone(),
        status: if outcome.is_completed() {
            RunStatus::Success
        } else {
            RunStatus::Failed
        },
        failed_stage: outcome.error().map(|e| e.stage.clone()),
        error: outcome.error().map(|e| e.cause.to_string()),
        sources: acc.registry().len(),
        sections,
        report_path: None,
    };

    let partial = !outcome.is_completed();
    if partial && !options.write_partial {
        warn!(stage = ?entry.failed_stage, "run failed, no report written");
        return CompanyRun { entry, outcome };
    }

    let report = compiler::compile(acc, &outline, options.report_date);
    let file_name = report_file_name(&company.ticker, options.report_date, partial);
    match write_atomically(&options.output_dir, &file_name, &report) {
        Ok(path) => entry.report_path = Some(path.display().to_string()),
        Err(e) => {
            error!(error = %e, "could not write report");
            entry.error = Some(match entry.error.take() {
                Some(prev) => format!("{prev}; {e}"),
                None => e.to_string(),
            });
        }
    }

    CompanyRun { entry, outcome }
}

/// Run every company with at most `concurrency` runs in flight.
///
/// Results come back in input order. A failed run never stops the batch.
pub async fn run_batch(
    pipeline: &Pipeline,
    companies: Vec<Company>,
    options: &OutputOptions,
    concurrency: usize,
    progress: &dyn ProgressReporter,
) -> Vec<CompanyRun> {
    let total = companies.len();
    info!(companies = total, concurrency, "batch started");

    let runs: Vec<CompanyRun> = stream::iter(companies)
        .map(|company| analyze_company(pipeline, company, options, progress))
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let succeeded = runs
        .iter()
        .filter(|r| r.entry.status == RunStatus::Success)
        .count();
    info!(succeeded, failed = total - succeeded, "batch finished");
    runs
}

/// Read a JSON array of `{name, ticker}` objects.
pub fn load_companies(path: &Path) -> Result<Vec<Company>> {
    let content = std::fs::read_to_string(path).map_err(|e| ShallowDiveError::io(path, e))?;
    let companies: Vec<Company> = serde_json::from_str(&content).map_err(|e| {
        ShallowDiveError::parse(format!("invalid companies file {}: {e}", path.display()))
    })?;

    if companies.is_empty() {
        return Err(ShallowDiveError::validation(format!(
            "companies file {} is empty",
            path.display()
        )));
    }
    if let Some(bad) = companies
        .iter()
        .find(|c| c.name.trim().is_empty() || c.ticker.trim().is_empty())
    {
        return Err(ShallowDiveError::validation(format!(
            "company entry {bad:?} needs both a name and a ticker"
        )));
    }
    Ok(companies)
}

/// `batch_results_{YYYYMMDD_HHMMSS}.csv`
pub fn summary_file_name(at: NaiveDateTime) -> String {
    format!("batch_results_{}.csv", at.format("%Y%m%d_%H%M%S"))
}

/// Write one CSV row per entry into `dir`.
pub fn write_summary_csv(dir: &Path, entries: &[BatchEntry], at: NaiveDateTime) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| ShallowDiveError::io(dir, e))?;
    let path = dir.join(summary_file_name(at));

    let mut writer = csv::Writer::from_path(&path)
        .map_err(|e| ShallowDiveError::Report(format!("{}: {e}", path.display())))?;
    for entry in entries {
        writer
            .serialize(entry)
            .map_err(|e| ShallowDiveError::Report(e.to_string()))?;
    }
    writer
        .flush()
        .map_err(|e| ShallowDiveError::io(&path, e))?;

    info!(path = %path.display(), rows = entries.len(), "batch summary written");
    Ok(path)
}
