//! Financial Modeling Prep raw data.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use shallowdive_core::{DataFetcher, FetchedData};
use shallowdive_shared::{Company, DataKind, Document, Result, ShallowDiveError};

/// History rows kept per financial series.
const MAX_ROWS: usize = 5;

/// Best-effort fetcher over the FMP `stable` endpoints.
pub struct FmpDataFetcher {
    client: Client,
    base_url: String,
    api_key: String,
}

impl FmpDataFetcher {
    pub fn new(base_url: &str, api_key: String, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: super::build_client(timeout_secs)?,
            base_url: super::base_url(base_url)?,
            api_key,
        })
    }

    /// Public URL of an endpoint, without the key. Used for citations.
    fn source_url(&self, endpoint: &str, ticker: &str) -> String {
        format!("{}/stable/{endpoint}?symbol={ticker}", self.base_url)
    }

    async fn get(&self, endpoint: &str, ticker: &str, extra: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}/stable/{endpoint}", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("symbol", ticker), ("apikey", self.api_key.as_str())])
            .query(extra)
            .send()
            .await
            .map_err(|e| ShallowDiveError::Fetch(format!("{endpoint}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ShallowDiveError::Fetch(format!("{endpoint}: HTTP {status}")));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| ShallowDiveError::Fetch(format!("{endpoint}: unreadable body: {e}")))?;

        if let Some(message) = value.get("Error Message").and_then(Value::as_str) {
            return Err(ShallowDiveError::Fetch(format!("{endpoint}: {message}")));
        }
        Ok(value)
    }

    /// First element of an array response, if any.
    async fn first_row(&self, endpoint: &str, ticker: &str) -> Result<Option<Value>> {
        let value = self.get(endpoint, ticker, &[]).await?;
        Ok(first_object(value))
    }

    async fn financial_metrics(&self, ticker: &str) -> Result<Option<Value>> {
        let (metrics, ttm, ratios, income) = tokio::try_join!(
            self.get("key-metrics", ticker, &[]),
            self.get("key-metrics-ttm", ticker, &[]),
            self.get("ratios", ticker, &[]),
            self.get("income-statement", ticker, &[("limit", "5")]),
        )?;

        let mut combined = Map::new();
        combined.insert("metrics".into(), capped(metrics));
        combined.insert("metrics_ttm".into(), ttm_value(ttm));
        combined.insert("ratios".into(), capped(ratios));
        combined.insert("income_statement".into(), capped(income));

        let all_empty = combined.values().all(is_empty);
        Ok((!all_empty).then_some(Value::Object(combined)))
    }
}

fn first_object(value: Value) -> Option<Value> {
    match value {
        Value::Array(rows) => rows.into_iter().next().filter(Value::is_object),
        Value::Object(map) if !map.is_empty() => Some(Value::Object(map)),
        _ => None,
    }
}

fn capped(value: Value) -> Value {
    match value {
        Value::Array(rows) => Value::Array(rows.into_iter().take(MAX_ROWS).collect()),
        _ => Value::Array(Vec::new()),
    }
}

fn ttm_value(value: Value) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) => value,
        _ => Value::Array(Vec::new()),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Array(rows) => rows.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Null => true,
        _ => false,
    }
}

#[async_trait]
impl DataFetcher for FmpDataFetcher {
    #[instrument(skip_all, fields(kind = %kind, ticker = %company.ticker))]
    async fn fetch(&self, kind: DataKind, company: &Company) -> Result<Option<FetchedData>> {
        let ticker = company.ticker.as_str();
        let (payload, endpoint, title) = match kind {
            DataKind::CompanyProfile => (
                self.first_row("profile", ticker).await?,
                "profile",
                format!("Financial Modeling Prep - {} Company Profile", company.name),
            ),
            DataKind::FinancialMetrics => (
                self.financial_metrics(ticker).await?,
                "key-metrics",
                format!("Financial Modeling Prep - {} Key Metrics", company.name),
            ),
            DataKind::MarketData => (
                self.first_row("quote", ticker).await?,
                "quote",
                format!("Financial Modeling Prep - {} Quote", company.name),
            ),
        };

        let Some(payload) = payload else {
            debug!("vendor returned no data");
            return Ok(None);
        };

        Ok(Some(FetchedData {
            payload,
            source: Some(Document::new(self.source_url(endpoint, ticker), title)),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn acme() -> Company {
        Company::new("Acme Corp", "ACME")
    }

    async fn mount(server: &MockServer, endpoint: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/stable/{endpoint}")))
            .and(query_param("symbol", "ACME"))
            .and(query_param("apikey", "k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn profile_is_first_row_with_keyless_source() {
        let server = MockServer::start().await;
        mount(&server, "profile", json!([{"companyName": "Acme Corp", "sector": "Tools"}])).await;

        let fetcher = FmpDataFetcher::new(&server.uri(), "k".into(), 5).unwrap();
        let fetched = fetcher
            .fetch(DataKind::CompanyProfile, &acme())
            .await
            .unwrap()
            .expect("profile");

        assert_eq!(fetched.payload["sector"], "Tools");
        let source = fetched.source.unwrap();
        assert_eq!(source.url, format!("{}/stable/profile?symbol=ACME", server.uri()));
        assert!(!source.url.contains("apikey"));
    }

    #[tokio::test]
    async fn metrics_are_combined_and_capped() {
        let server = MockServer::start().await;
        let rows: Vec<Value> = (0..8).map(|year| json!({"year": year})).collect();
        mount(&server, "key-metrics", Value::Array(rows.clone())).await;
        mount(&server, "key-metrics-ttm", json!([{"peRatioTTM": 18.5}])).await;
        mount(&server, "ratios", Value::Array(rows)).await;
        mount(&server, "income-statement", json!([])).await;

        let fetcher = FmpDataFetcher::new(&server.uri(), "k".into(), 5).unwrap();
        let fetched = fetcher
            .fetch(DataKind::FinancialMetrics, &acme())
            .await
            .unwrap()
            .expect("metrics");

        assert_eq!(fetched.payload["metrics"].as_array().unwrap().len(), 5);
        assert_eq!(fetched.payload["ratios"].as_array().unwrap().len(), 5);
        assert_eq!(fetched.payload["metrics_ttm"][0]["peRatioTTM"], 18.5);
        assert!(fetched.payload["income_statement"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_quote_is_none() {
        let server = MockServer::start().await;
        mount(&server, "quote", json!([])).await;

        let fetcher = FmpDataFetcher::new(&server.uri(), "k".into(), 5).unwrap();
        assert!(fetcher.fetch(DataKind::MarketData, &acme()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn vendor_error_message_is_a_fetch_error() {
        let server = MockServer::start().await;
        mount(&server, "quote", json!({"Error Message": "Invalid API KEY."})).await;

        let fetcher = FmpDataFetcher::new(&server.uri(), "k".into(), 5).unwrap();
        let err = fetcher.fetch(DataKind::MarketData, &acme()).await.unwrap_err();
        assert!(matches!(err, ShallowDiveError::Fetch(ref m) if m.contains("Invalid API KEY")));
    }
}
