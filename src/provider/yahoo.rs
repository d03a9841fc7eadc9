//! Yahoo Finance over RapidAPI: news lists and quote+chart bundles.

use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::{header::HeaderMap, Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use url::Url;

use super::ProviderClient;
use crate::cache::record::Item;
use crate::config::Config;
use crate::error::CacheError;

const NEWS_ENDPOINT: &str = "api/v2/markets/news";
const QUOTES_ENDPOINT: &str = "api/v1/markets/stock/quotes";
const HISTORY_ENDPOINT: &str = "api/v2/markets/stock/history";
const CHART_INTERVAL: &str = "1d";
const CHART_POINTS: &str = "30";

/// Used when a 429 carries no usable `retry-after` header.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    body: Option<Vec<Item>>,
}

/// Connection details shared by every RapidAPI-backed client.
#[derive(Clone)]
struct RapidApi {
    http: Client,
    base_url: Url,
    api_key: String,
    api_host: String,
}

impl RapidApi {
    fn new(base_url: &str, api_key: &str, api_host: &str, timeout: Duration) -> Result<Self, CacheError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| CacheError::Config(format!("Invalid provider base URL {}: {}", base_url, e)))?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CacheError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url,
            api_key: api_key.to_string(),
            api_host: api_host.to_string(),
        })
    }

    fn from_config(config: &Config) -> Result<Option<Self>, CacheError> {
        match &config.rapidapi_key {
            Some(key) => Self::new(
                &config.provider_base_url,
                key,
                &config.rapidapi_host,
                config.provider_timeout(),
            )
            .map(Some),
            None => Ok(None),
        }
    }

    fn url(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Url, CacheError> {
        let mut url = self
            .base_url
            .join(endpoint)
            .map_err(|e| CacheError::Config(format!("Invalid endpoint {}: {}", endpoint, e)))?;
        url.query_pairs_mut().extend_pairs(params);
        Ok(url)
    }

    /// GETs `url` and returns the body of a 2xx response.
    async fn get(&self, ticker: &str, url: Url) -> Result<String, CacheError> {
        let response = self
            .http
            .get(url)
            .header("x-rapidapi-host", &self.api_host)
            .header("x-rapidapi-key", &self.api_key)
            .send()
            .await
            .map_err(|e| {
                error!("❌ Request for {} failed: {}", ticker, e);
                CacheError::from(e)
            })?;

        if let Some(err) = classify_status(ticker, response.status(), response.headers()) {
            warn!("⚠️ Provider rejected request for {}: {}", ticker, err);
            return Err(err);
        }
        Ok(response.text().await?)
    }
}

impl std::fmt::Debug for RapidApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RapidApi")
            .field("base_url", &self.base_url.as_str())
            .field("api_host", &self.api_host)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct YahooNewsClient {
    api: RapidApi,
}

impl YahooNewsClient {
    pub fn new(base_url: &str, api_key: &str, api_host: &str, timeout: Duration) -> Result<Self, CacheError> {
        let api = RapidApi::new(base_url, api_key, api_host, timeout)?;
        info!("Initialized Yahoo Finance news client for {}", api.base_url);
        Ok(Self { api })
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>, CacheError> {
        Ok(RapidApi::from_config(config)?.map(|api| Self { api }))
    }

    fn news_url(&self, ticker: &str) -> Result<Url, CacheError> {
        self.api.url(NEWS_ENDPOINT, &[("tickers", ticker), ("type", "ALL")])
    }
}

/// Quote plus a month of daily chart points, cached as one bundle per ticker.
#[derive(Debug, Clone)]
pub struct YahooQuoteClient {
    api: RapidApi,
}

impl YahooQuoteClient {
    pub fn new(base_url: &str, api_key: &str, api_host: &str, timeout: Duration) -> Result<Self, CacheError> {
        let api = RapidApi::new(base_url, api_key, api_host, timeout)?;
        info!("Initialized Yahoo Finance quote client for {}", api.base_url);
        Ok(Self { api })
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>, CacheError> {
        Ok(RapidApi::from_config(config)?.map(|api| Self { api }))
    }

    fn quote_url(&self, ticker: &str) -> Result<Url, CacheError> {
        self.api.url(QUOTES_ENDPOINT, &[("ticker", ticker)])
    }

    fn chart_url(&self, ticker: &str) -> Result<Url, CacheError> {
        self.api.url(
            HISTORY_ENDPOINT,
            &[("symbol", ticker), ("interval", CHART_INTERVAL), ("limit", CHART_POINTS)],
        )
    }

    async fn fetch_quote(&self, ticker: &str) -> Result<Item, CacheError> {
        let raw = self.api.get(ticker, self.quote_url(ticker)?).await?;
        parse_quote_body(ticker, &raw)
    }

    async fn fetch_chart(&self, ticker: &str) -> Result<Item, CacheError> {
        let raw = self.api.get(ticker, self.chart_url(ticker)?).await?;
        parse_chart_body(ticker, &raw)
    }
}

/// Seconds from a `retry-after` header, defaulting when absent or not numeric.
pub fn parse_retry_after(headers: &HeaderMap) -> u64 {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

/// Extracts the article list from a news response body.
pub fn parse_news_body(ticker: &str, raw: &str) -> Result<Vec<Item>, CacheError> {
    let response: NewsResponse = serde_json::from_str(raw)?;
    match response.body {
        Some(items) => Ok(items),
        None => Err(CacheError::EmptyResult(format!("No news data found for {}", ticker))),
    }
}

/// First quote out of whichever envelope the quotes endpoint used.
pub fn parse_quote_body(ticker: &str, raw: &str) -> Result<Item, CacheError> {
    let value: Item = serde_json::from_str(raw)?;
    let first = match &value {
        Item::Array(list) => list.first().cloned(),
        Item::Object(map) => match map.get("body").or_else(|| map.get("data")) {
            Some(Item::Array(list)) => list.first().cloned(),
            Some(inner @ Item::Object(_)) => Some(inner.clone()),
            Some(_) => None,
            None if map.is_empty() => None,
            None => Some(value.clone()),
        },
        _ => None,
    };
    first.ok_or_else(|| CacheError::EmptyResult(format!("No quote data found for {}", ticker)))
}

/// Chart payload; a body without `items`, `body` or `data` carries no points.
pub fn parse_chart_body(ticker: &str, raw: &str) -> Result<Item, CacheError> {
    let value: Item = serde_json::from_str(raw)?;
    let has_points = ["items", "body", "data"]
        .iter()
        .any(|field| value.get(field).map_or(false, |v| !v.is_null()));
    if has_points {
        Ok(value)
    } else {
        Err(CacheError::EmptyResult(format!("No chart data found for {}", ticker)))
    }
}

/// Builds the cached bundle. Either half may be missing; both missing is an
/// error carrying the quote failure.
pub fn quote_bundle(
    ticker: &str,
    quote: Result<Item, CacheError>,
    chart: Result<Item, CacheError>,
) -> Result<Item, CacheError> {
    match (quote, chart) {
        (Err(quote_err), Err(chart_err)) => {
            debug!("Chart fetch for {} also failed: {}", ticker, chart_err);
            Err(quote_err)
        }
        (quote, chart) => {
            if let Err(err) = &quote {
                warn!("⚠️ Caching {} without a quote: {}", ticker, err);
            }
            if let Err(err) = &chart {
                warn!("⚠️ Caching {} without a chart: {}", ticker, err);
            }
            Ok(json!({
                "symbol": ticker,
                "quote": quote.ok(),
                "chart": chart.ok(),
            }))
        }
    }
}

pub fn classify_status(ticker: &str, status: StatusCode, headers: &HeaderMap) -> Option<CacheError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Some(CacheError::ProviderRateLimited {
            message: format!("Rate limit exceeded for {}", ticker),
            retry_after_secs: Some(parse_retry_after(headers)),
        });
    }
    if !status.is_success() {
        return Some(CacheError::ProviderUnavailable(format!(
            "API Error: {} - {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("unknown")
        )));
    }
    None
}

#[async_trait]
impl ProviderClient for YahooNewsClient {
    fn name(&self) -> &str {
        "yahoo-finance-news"
    }

    async fn fetch_one(&self, key: &str) -> Result<Vec<Item>, CacheError> {
        debug!("🔍 Fetching news for ticker: {}", key);
        let raw = self.api.get(key, self.news_url(key)?).await?;
        let items = parse_news_body(key, &raw)?;
        info!("✅ Fetched {} news articles for {}", items.len(), key);
        Ok(items)
    }
}

#[async_trait]
impl ProviderClient for YahooQuoteClient {
    fn name(&self) -> &str {
        "yahoo-finance-quotes"
    }

    async fn fetch_one(&self, key: &str) -> Result<Vec<Item>, CacheError> {
        debug!("📈 Fetching quote and chart for ticker: {}", key);
        let (quote, chart) = tokio::join!(self.fetch_quote(key), self.fetch_chart(key));
        let bundle = quote_bundle(key, quote, chart)?;
        info!("✅ Fetched quote bundle for {}", key);
        Ok(vec![bundle])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, RETRY_AFTER};

    #[test]
    fn parses_body_items() {
        let raw = r#"{"meta":{"total":2},"body":[{"title":"a"},{"title":"b"}]}"#;
        let items = parse_news_body("AAPL", raw).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn missing_body_is_empty_result() {
        let err = parse_news_body("AAPL", r#"{"meta":{}}"#).unwrap_err();
        assert!(matches!(err, CacheError::EmptyResult(_)));
    }

    #[test]
    fn rate_limit_uses_header_or_default() {
        let mut headers = HeaderMap::new();
        let err = classify_status("AAPL", StatusCode::TOO_MANY_REQUESTS, &headers).unwrap();
        assert_eq!(err.retry_after_secs(), Some(DEFAULT_RETRY_AFTER_SECS));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("17"));
        let err = classify_status("AAPL", StatusCode::TOO_MANY_REQUESTS, &headers).unwrap();
        assert_eq!(err.retry_after_secs(), Some(17));
    }

    #[test]
    fn server_errors_are_unavailable() {
        let err = classify_status("AAPL", StatusCode::BAD_GATEWAY, &HeaderMap::new()).unwrap();
        assert!(matches!(err, CacheError::ProviderUnavailable(_)));
        assert!(classify_status("AAPL", StatusCode::OK, &HeaderMap::new()).is_none());
    }

    #[test]
    fn news_url_carries_ticker() {
        let client = YahooNewsClient::new(
            "https://yahoo-finance15.p.rapidapi.com",
            "key",
            "yahoo-finance15.p.rapidapi.com",
            Duration::from_secs(5),
        )
        .unwrap();
        let url = client.news_url("AAPL").unwrap();
        assert_eq!(
            url.as_str(),
            "https://yahoo-finance15.p.rapidapi.com/api/v2/markets/news?tickers=AAPL&type=ALL"
        );
    }

    #[test]
    fn quote_body_accepts_each_envelope() {
        let wrapped = parse_quote_body("KO", r#"{"body":[{"symbol":"KO","price":61.2}]}"#).unwrap();
        assert_eq!(wrapped["price"], json!(61.2));
        let bare = parse_quote_body("KO", r#"[{"symbol":"KO"}]"#).unwrap();
        assert_eq!(bare["symbol"], json!("KO"));
        let single = parse_quote_body("KO", r#"{"symbol":"KO","price":1}"#).unwrap();
        assert_eq!(single["price"], json!(1));
        assert!(matches!(
            parse_quote_body("KO", r#"{"body":[]}"#),
            Err(CacheError::EmptyResult(_))
        ));
    }

    #[test]
    fn chart_without_points_is_empty() {
        assert!(parse_chart_body("KO", r#"{"body":{"1714521600":{"close":60.1}}}"#).is_ok());
        assert!(matches!(
            parse_chart_body("KO", r#"{"meta":{}}"#),
            Err(CacheError::EmptyResult(_))
        ));
    }

    #[test]
    fn bundle_survives_one_missing_half() {
        let bundle = quote_bundle(
            "KO",
            Ok(json!({"price": 61.2})),
            Err(CacheError::ProviderUnavailable("API Error: 502".to_string())),
        )
        .unwrap();
        assert_eq!(bundle["symbol"], json!("KO"));
        assert_eq!(bundle["quote"]["price"], json!(61.2));
        assert!(bundle["chart"].is_null());

        let err = quote_bundle(
            "KO",
            Err(CacheError::ProviderUnavailable("quote down".to_string())),
            Err(CacheError::ProviderUnavailable("chart down".to_string())),
        )
        .unwrap_err();
        assert_eq!(err, CacheError::ProviderUnavailable("quote down".to_string()));
    }

    #[test]
    fn quote_client_urls() {
        let client = YahooQuoteClient::new(
            "https://yahoo-finance15.p.rapidapi.com",
            "key",
            "yahoo-finance15.p.rapidapi.com",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.quote_url("KO").unwrap().as_str(),
            "https://yahoo-finance15.p.rapidapi.com/api/v1/markets/stock/quotes?ticker=KO"
        );
        assert_eq!(
            client.chart_url("KO").unwrap().as_str(),
            "https://yahoo-finance15.p.rapidapi.com/api/v2/markets/stock/history?symbol=KO&interval=1d&limit=30"
        );
    }
}
