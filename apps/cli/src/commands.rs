//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use chrono::Local;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use shallowdive_core::{
    BatchEntry, OutputOptions, ProgressReporter, RunOutcome, RunStatus, analyze_company,
    load_companies, run_batch, standard_pipeline, standard_stages, write_summary_csv,
};
use shallowdive_providers::build_toolkit;
use shallowdive_shared::{AppConfig, Company, init_config, load_config, validate_api_keys};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Shallow Dive: investment-grade company research reports.
#[derive(Parser)]
#[command(
    name = "shallowdive",
    version,
    about = "Generate cited, sectioned equity research reports from web research and financial data.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Research one company and write its report.
    Analyze {
        /// Company name, e.g. "Acme Corp".
        #[arg(short, long)]
        company: String,

        /// Exchange ticker, e.g. ACME.
        #[arg(short, long)]
        ticker: String,

        /// Output directory (defaults to config `output_dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Write a partial report if the run fails.
        #[arg(long)]
        partial: bool,
    },

    /// Research every company in a JSON file of `{name, ticker}` objects.
    Batch {
        /// Path to the companies file.
        file: PathBuf,

        /// Output directory (defaults to config `output_dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Maximum runs in flight (defaults to config `batch_concurrency`).
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Write partial reports for failed runs.
        #[arg(long)]
        partial: bool,
    },

    /// Print the fixed stage order.
    Stages,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "shallowdive=info",
        1 => "shallowdive=debug",
        _ => "shallowdive=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Analyze {
            company,
            ticker,
            out,
            partial,
        } => cmd_analyze(Company::new(company.trim(), ticker.trim()), out, partial).await,
        Command::Batch {
            file,
            out,
            concurrency,
            partial,
        } => cmd_batch(&file, out, concurrency, partial).await,
        Command::Stages => cmd_stages(),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

fn output_options(config: &AppConfig, out: Option<PathBuf>, partial: bool) -> OutputOptions {
    OutputOptions {
        output_dir: out.unwrap_or_else(|| PathBuf::from(&config.defaults.output_dir)),
        write_partial: partial || config.defaults.write_partial_reports,
        report_date: Local::now().date_naive(),
    }
}

async fn cmd_analyze(company: Company, out: Option<PathBuf>, partial: bool) -> Result<()> {
    if company.name.is_empty() || company.ticker.is_empty() {
        return Err(eyre!("both --company and --ticker must be non-empty"));
    }

    let config = load_config()?;
    validate_api_keys(&config)?;
    let pipeline = standard_pipeline(build_toolkit(&config)?)?;
    let options = output_options(&config, out, partial);

    info!(company = %company.name, ticker = %company.ticker, "starting analysis");
    let reporter = CliProgress::new();
    let run = analyze_company(&pipeline, company, &options, &reporter).await;
    reporter.finish();

    let entry = &run.entry;
    println!();
    match entry.status {
        RunStatus::Success => println!("  Analysis complete: {} ({})", entry.company, entry.ticker),
        RunStatus::Failed => println!("  Analysis failed: {} ({})", entry.company, entry.ticker),
    }
    println!("  Sections: {}", entry.sections);
    println!("  Sources:  {}", entry.sources);
    if let Some(path) = &entry.report_path {
        println!("  Report:   {path}");
    }
    println!();

    match run.outcome.error() {
        Some(error) => Err(eyre!("run stopped at stage '{}': {}", error.stage, error.cause)),
        None => match &entry.error {
            Some(write_error) => Err(eyre!("report not written: {write_error}")),
            None => Ok(()),
        },
    }
}

async fn cmd_batch(
    file: &Path,
    out: Option<PathBuf>,
    concurrency: Option<usize>,
    partial: bool,
) -> Result<()> {
    let companies = load_companies(file)?;
    let config = load_config()?;
    validate_api_keys(&config)?;
    let pipeline = standard_pipeline(build_toolkit(&config)?)?;
    let options = output_options(&config, out, partial);
    let concurrency = concurrency.unwrap_or(config.defaults.batch_concurrency).max(1);

    info!(companies = companies.len(), concurrency, "starting batch");
    let reporter = CliProgress::new();
    let runs = run_batch(&pipeline, companies, &options, concurrency, &reporter).await;
    reporter.finish();

    let entries: Vec<BatchEntry> = runs.into_iter().map(|r| r.entry).collect();
    let summary = write_summary_csv(&options.output_dir, &entries, Local::now().naive_local())?;

    print_batch_table(&entries);
    println!("  Summary: {}", summary.display());
    println!();
    Ok(())
}

fn print_batch_table(entries: &[BatchEntry]) {
    let succeeded = entries
        .iter()
        .filter(|e| e.status == RunStatus::Success)
        .count();

    println!();
    println!("  {:<10} {:<8} {:>8} {:>8}  {}", "TICKER", "STATUS", "SECTIONS", "SOURCES", "NOTE");
    for e in entries {
        let status = match e.status {
            RunStatus::Success => "ok",
            RunStatus::Failed => "failed",
        };
        let note = match (&e.failed_stage, &e.report_path) {
            (Some(stage), _) => format!("stopped at {stage}"),
            (None, Some(path)) => path.clone(),
            (None, None) => String::new(),
        };
        println!(
            "  {:<10} {:<8} {:>8} {:>8}  {}",
            e.ticker, status, e.sections, e.sources, note
        );
    }
    println!();
    println!("  {succeeded}/{} succeeded", entries.len());
}

fn cmd_stages() -> Result<()> {
    for (i, stage) in standard_stages().iter().enumerate() {
        let heading = stage.heading().unwrap_or("(research only)");
        println!("{:>3}. {:<18} {heading}", i + 1, stage.name());
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn run_started(&self, company: &Company, total_stages: usize) {
        self.spinner
            .set_message(format!("{}: starting {total_stages} stages", company.ticker));
    }

    fn stage_started(&self, company: &Company, index: usize, total: usize, name: &str) {
        self.spinner
            .set_message(format!("{} [{}/{total}] {name}", company.ticker, index + 1));
    }

    fn stage_finished(&self, _company: &Company, _index: usize, _total: usize, _name: &str) {}

    fn run_finished(&self, company: &Company, outcome: &RunOutcome) {
        let line = match outcome.error() {
            None => format!("  done   {} ({})", company.name, company.ticker),
            Some(e) => format!("  failed {} ({}) at {}", company.name, company.ticker, e.stage),
        };
        self.spinner.println(line);
    }
}
