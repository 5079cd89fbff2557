//! Report file naming and atomic writes.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::info;

use shallowdive_shared::{Result, ShallowDiveError};

/// `shallow_dive_{TICKER}_{YYYYMMDD}.md`, with `_partial` before the
/// extension for reports of failed runs.
pub fn report_file_name(ticker: &str, date: NaiveDate, partial: bool) -> String {
    let ticker: String = ticker
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c.to_ascii_uppercase() } else { '_' })
        .collect();
    let suffix = if partial { "_partial" } else { "" };
    format!("shallow_dive_{ticker}_{}{suffix}.md", date.format("%Y%m%d"))
}

/// Write `content` to `dir/file_name` through a temp file and rename, so a
/// reader never sees a half-written report.
pub fn write_atomically(dir: &Path, file_name: &str, content: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| ShallowDiveError::io(dir, e))?;

    let target = dir.join(file_name);
    let temp = dir.join(format!(".{file_name}.tmp"));
    std::fs::write(&temp, content).map_err(|e| ShallowDiveError::io(&temp, e))?;
    std::fs::rename(&temp, &target).map_err(|e| ShallowDiveError::io(&target, e))?;

    info!(path = %target.display(), bytes = content.len(), "report written");
    Ok(target)
}
