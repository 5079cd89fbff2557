//! HTTP implementations of the pipeline's collaborators.
//!
//! - [`TavilySearch`]: web search [`FactFinder`](shallowdive_core::FactFinder)
//! - [`ChatNarrator`]: OpenAI-compatible chat completions
//!   [`NarrativeGenerator`](shallowdive_core::NarrativeGenerator)
//! - [`FmpDataFetcher`]: company profile, metrics and quotes
//!   [`DataFetcher`](shallowdive_core::DataFetcher)
//!
//! [`build_toolkit`] wires all three from an [`AppConfig`].

mod chat;
mod fmp;
mod search;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{info, warn};
use url::Url;

use shallowdive_core::{DataFetcher, NoopDataFetcher, ResearchSettings, Toolkit};
use shallowdive_shared::{AppConfig, Result, ShallowDiveError, read_key, resolve_llm_endpoint};

pub use chat::ChatNarrator;
pub use fmp::FmpDataFetcher;
pub use search::TavilySearch;

/// User-Agent string for outbound requests.
const USER_AGENT: &str = concat!("ShallowDive/", env!("CARGO_PKG_VERSION"));

/// Build a reqwest client with the given request timeout.
fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ShallowDiveError::Network(format!("failed to build HTTP client: {e}")))
}

/// Validate a configured base URL and return it without a trailing slash.
fn base_url(raw: &str) -> Result<String> {
    let parsed = Url::parse(raw)
        .map_err(|e| ShallowDiveError::config(format!("invalid base URL '{raw}': {e}")))?;
    if parsed.host_str().is_none() {
        return Err(ShallowDiveError::config(format!("base URL has no host: {raw}")));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

/// Assemble the collaborators for a production run.
///
/// Fails if the language model or search key is missing. A missing
/// financial data key only disables raw-data enrichment.
pub fn build_toolkit(config: &AppConfig) -> Result<Toolkit> {
    let endpoint = resolve_llm_endpoint(config)?;
    info!(provider = ?endpoint.provider, model = %endpoint.model, "language model selected");
    let narrator = ChatNarrator::new(endpoint)?;

    let search_key = read_key(&config.search.api_key_env).ok_or_else(|| {
        ShallowDiveError::config(format!(
            "no search key found. Set {}.",
            config.search.api_key_env
        ))
    })?;
    let search = TavilySearch::new(&config.search.base_url, search_key, config.search.timeout_secs)?;

    let data: Arc<dyn DataFetcher> = match read_key(&config.financial_data.api_key_env) {
        Some(key) => Arc::new(FmpDataFetcher::new(
            &config.financial_data.base_url,
            key,
            config.financial_data.timeout_secs,
        )?),
        None => {
            warn!(
                env = %config.financial_data.api_key_env,
                "financial data key not set, continuing without raw data"
            );
            Arc::new(NoopDataFetcher)
        }
    };

    Ok(Toolkit::new(Arc::new(search), Arc::new(narrator))
        .with_data_fetcher(data)
        .with_settings(ResearchSettings {
            results_per_query: config.defaults.search_results,
        }))
}
