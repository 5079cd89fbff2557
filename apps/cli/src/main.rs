//! Shallow Dive CLI.
//!
//! Runs the staged research pipeline for one company or a batch and writes
//! Markdown reports with a numbered bibliography.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
