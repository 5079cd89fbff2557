//! Application configuration for Shallow Dive.
//!
//! User config lives at `~/.shallowdive/shallowdive.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShallowDiveError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "shallowdive.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".shallowdive";

// ---------------------------------------------------------------------------
// Config structs (matching shallowdive.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Language model settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Web search settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Financial data API settings.
    #[serde(default)]
    pub financial_data: FinancialDataConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory reports and batch summaries are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Results requested per search query.
    #[serde(default = "default_search_results")]
    pub search_results: usize,

    /// Companies analyzed in parallel during a batch.
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,

    /// Write a partial report when a run fails.
    #[serde(default)]
    pub write_partial_reports: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            search_results: default_search_results(),
            batch_concurrency: default_batch_concurrency(),
            write_partial_reports: false,
        }
    }
}

fn default_output_dir() -> String {
    ".".into()
}
fn default_search_results() -> usize {
    5
}
fn default_batch_concurrency() -> usize {
    1
}

/// `[llm]` section. OpenRouter is used when its key is present, OpenAI otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the OpenRouter key (never store the key itself).
    #[serde(default = "default_openrouter_key_env")]
    pub openrouter_api_key_env: String,

    #[serde(default = "default_openrouter_base_url")]
    pub openrouter_base_url: String,

    #[serde(default = "default_openrouter_model")]
    pub openrouter_model: String,

    /// Name of the env var holding the OpenAI key.
    #[serde(default = "default_openai_key_env")]
    pub openai_api_key_env: String,

    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-request timeout.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openrouter_api_key_env: default_openrouter_key_env(),
            openrouter_base_url: default_openrouter_base_url(),
            openrouter_model: default_openrouter_model(),
            openai_api_key_env: default_openai_key_env(),
            openai_base_url: default_openai_base_url(),
            openai_model: default_openai_model(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_openrouter_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_openrouter_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_openrouter_model() -> String {
    "openai/gpt-4o".into()
}
fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_openai_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_llm_timeout() -> u64 {
    180
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_search_base_url")]
    pub base_url: String,

    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_search_key_env(),
            base_url: default_search_base_url(),
            timeout_secs: default_http_timeout(),
        }
    }
}

fn default_search_key_env() -> String {
    "TAVILY_API_KEY".into()
}
fn default_search_base_url() -> String {
    "https://api.tavily.com".into()
}
fn default_http_timeout() -> u64 {
    20
}

/// `[financial_data]` section. Optional; without a key, raw-data enrichment is skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialDataConfig {
    #[serde(default = "default_fmp_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_fmp_base_url")]
    pub base_url: String,

    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for FinancialDataConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_fmp_key_env(),
            base_url: default_fmp_base_url(),
            timeout_secs: default_http_timeout(),
        }
    }
}

fn default_fmp_key_env() -> String {
    "FMP_API_KEY".into()
}
fn default_fmp_base_url() -> String {
    "https://financialmodelingprep.com".into()
}

// ---------------------------------------------------------------------------
// Resolved LLM endpoint
// ---------------------------------------------------------------------------

/// Which chat-completions provider a run talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenRouter,
    OpenAi,
}

/// Runtime LLM endpoint, resolved from config + environment.
#[derive(Clone)]
pub struct LlmEndpoint {
    pub provider: LlmProvider,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for LlmEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmEndpoint")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Pick OpenRouter if its key is set, else OpenAI.
pub fn resolve_llm_endpoint(config: &AppConfig) -> Result<LlmEndpoint> {
    let llm = &config.llm;
    if let Some(key) = read_key(&llm.openrouter_api_key_env) {
        return Ok(LlmEndpoint {
            provider: LlmProvider::OpenRouter,
            base_url: llm.openrouter_base_url.clone(),
            api_key: key,
            model: llm.openrouter_model.clone(),
            temperature: llm.temperature,
            timeout_secs: llm.timeout_secs,
        });
    }
    if let Some(key) = read_key(&llm.openai_api_key_env) {
        return Ok(LlmEndpoint {
            provider: LlmProvider::OpenAi,
            base_url: llm.openai_base_url.clone(),
            api_key: key,
            model: llm.openai_model.clone(),
            temperature: llm.temperature,
            timeout_secs: llm.timeout_secs,
        });
    }
    Err(ShallowDiveError::config(format!(
        "no language model key found. Set {} or {}.",
        llm.openrouter_api_key_env, llm.openai_api_key_env
    )))
}

/// Read a non-empty API key from the named env var.
pub fn read_key(var_name: &str) -> Option<String> {
    std::env::var(var_name).ok().filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.shallowdive/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ShallowDiveError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.shallowdive/shallowdive.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ShallowDiveError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ShallowDiveError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ShallowDiveError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ShallowDiveError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ShallowDiveError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Names of required env vars that are missing or empty.
pub fn missing_api_keys(config: &AppConfig) -> Vec<String> {
    let mut missing = Vec::new();
    let llm = &config.llm;
    if read_key(&llm.openrouter_api_key_env).is_none() && read_key(&llm.openai_api_key_env).is_none()
    {
        missing.push(format!(
            "{} or {}",
            llm.openrouter_api_key_env, llm.openai_api_key_env
        ));
    }
    if read_key(&config.search.api_key_env).is_none() {
        missing.push(config.search.api_key_env.clone());
    }
    missing
}

/// Check that every required API key env var is set and non-empty.
pub fn validate_api_keys(config: &AppConfig) -> Result<()> {
    let missing = missing_api_keys(config);
    if missing.is_empty() {
        return Ok(());
    }
    Err(ShallowDiveError::config(format!(
        "missing required environment variables: {}",
        missing.join(", ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isolated_config() -> AppConfig {
        // Unique env var names keep these tests independent of the host environment
        let mut config = AppConfig::default();
        config.llm.openrouter_api_key_env = "SD_TEST_NONEXISTENT_OPENROUTER_1".into();
        config.llm.openai_api_key_env = "SD_TEST_NONEXISTENT_OPENAI_1".into();
        config.search.api_key_env = "SD_TEST_NONEXISTENT_SEARCH_1".into();
        config
    }

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("output_dir"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
        assert!(toml_str.contains("TAVILY_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.search_results, 5);
        assert_eq!(parsed.llm.openrouter_model, "openai/gpt-4o");
        assert_eq!(parsed.financial_data.api_key_env, "FMP_API_KEY");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
output_dir = "/tmp/reports"
batch_concurrency = 3

[llm]
openai_model = "gpt-4o-mini"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.output_dir, "/tmp/reports");
        assert_eq!(config.defaults.batch_concurrency, 3);
        assert_eq!(config.defaults.search_results, 5);
        assert_eq!(config.llm.openai_model, "gpt-4o-mini");
        assert_eq!(config.search.base_url, "https://api.tavily.com");
    }

    #[test]
    fn api_key_validation_lists_every_missing_var() {
        let config = isolated_config();
        let err = validate_api_keys(&config).unwrap_err().to_string();
        assert!(err.contains("SD_TEST_NONEXISTENT_OPENROUTER_1 or SD_TEST_NONEXISTENT_OPENAI_1"));
        assert!(err.contains("SD_TEST_NONEXISTENT_SEARCH_1"));
    }

    #[test]
    fn llm_endpoint_requires_a_key() {
        let config = isolated_config();
        assert!(resolve_llm_endpoint(&config).is_err());
    }

    #[test]
    fn llm_endpoint_debug_hides_key() {
        let endpoint = LlmEndpoint {
            provider: LlmProvider::OpenAi,
            base_url: "https://api.openai.com/v1".into(),
            api_key: "sk-secret".into(),
            model: "gpt-4o".into(),
            temperature: 0.3,
            timeout_secs: 10,
        };
        assert!(!format!("{endpoint:?}").contains("sk-secret"));
    }
}
