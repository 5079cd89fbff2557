//! Shared types, error model, and configuration for Shallow Dive.
//!
//! This crate is the foundation depended on by all other Shallow Dive crates.
//! It provides:
//! - [`ShallowDiveError`] and [`StageError`]: the unified error types
//! - Domain types ([`Company`], [`Document`], [`SourceEntry`], [`DataKind`], [`RunId`])
//! - Configuration ([`AppConfig`], config loading, API key checks)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, FinancialDataConfig, LlmConfig, LlmEndpoint, LlmProvider,
    SearchConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    missing_api_keys, read_key, resolve_llm_endpoint, validate_api_keys,
};
pub use error::{Result, ShallowDiveError, StageError};
pub use types::{Company, DataKind, Document, RunId, SNIPPET_MAX_CHARS, SourceEntry};
