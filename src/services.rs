use crate::config::Config;
use crate::errors::AppError;
use crate::investment::{NewsDigest, NewsItem, PricePoint, StockSeries};
use crate::models::CompanySuggestion;
use async_trait::async_trait;
use chrono::NaiveDate;
use moka::future::Cache;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Maximum suggestions returned for one query.
pub const MAX_SUGGESTIONS: usize = 10;
const DIRECTORY_CACHE_KEY: &str = "directory";
const DIRECTORY_TTL: Duration = Duration::from_secs(3600);

/// Current quote, monthly history and name lookup for listed stocks.
///
/// `Ok(None)` means the provider answered but had no usable data; transport failures are
/// errors.
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn search_symbol(&self, company_name: &str) -> Result<Option<String>, AppError>;
    async fn stock_snapshot(&self, symbol: &str) -> Result<Option<StockSeries>, AppError>;
}

#[async_trait]
pub trait NewsFeed: Send + Sync {
    async fn headlines(&self, query: &str) -> Result<Option<NewsDigest>, AppError>;
}

/// Name-to-ticker suggestions. Failures degrade to an empty list.
#[async_trait]
pub trait CompanyDirectory: Send + Sync {
    async fn suggestions(&self, input: &str) -> Vec<CompanySuggestion>;
}

pub struct AlphaVantageService {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AlphaVantageService {
    /// Creates a new Alpha Vantage client.
    ///
    /// # Arguments
    ///
    /// * `client` - Shared HTTP client.
    /// * `config` - Supplies the query endpoint URL and API key.
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.stocks_api_url.clone(),
            api_key: config.stocks_api_key.clone(),
        }
    }

    /// One query-endpoint call; `None` on a non-success status.
    async fn query(&self, params: &[(&str, &str)]) -> Result<Option<Value>, AppError> {
        let mut all_params: Vec<(&str, &str)> = params.to_vec();
        all_params.push(("apikey", self.api_key.as_str()));
        let url = reqwest::Url::parse_with_params(&self.base_url, &all_params).map_err(|e| {
            AppError::ExternalApiError(format!("Failed to build Alpha Vantage URL: {}", e))
        })?;

        let shown: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        tracing::debug!(
            "Alpha Vantage URL: {}?{}&apikey=[REDACTED]",
            self.base_url,
            shown.join("&")
        );

        let response = self.client.get(url).send().await.map_err(|e| {
            AppError::ExternalApiError(format!("Alpha Vantage request failed: {}", e))
        })?;

        if !response.status().is_success() {
            tracing::warn!(
                "Alpha Vantage returned status {} for {:?}",
                response.status(),
                params.first()
            );
            return Ok(None);
        }

        let data: Value = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse Alpha Vantage response: {}", e))
        })?;
        Ok(Some(data))
    }

    async fn current_price(&self, symbol: &str) -> Result<Option<f64>, AppError> {
        let data = match self
            .query(&[("function", "GLOBAL_QUOTE"), ("symbol", symbol)])
            .await?
        {
            Some(data) => data,
            None => return Ok(None),
        };
        Ok(data
            .get("Global Quote")
            .and_then(|q| q.get("05. price"))
            .and_then(number_field))
    }

    async fn monthly_history(&self, symbol: &str) -> Result<Option<Vec<PricePoint>>, AppError> {
        let data = match self
            .query(&[("function", "TIME_SERIES_MONTHLY_ADJUSTED"), ("symbol", symbol)])
            .await?
        {
            Some(data) => data,
            None => return Ok(None),
        };
        let series = match data
            .get("Monthly Adjusted Time Series")
            .and_then(Value::as_object)
        {
            Some(series) => series,
            None => {
                tracing::warn!("No monthly series for {}; continuing with empty history", symbol);
                return Ok(Some(Vec::new()));
            }
        };

        let mut points = Vec::with_capacity(series.len());
        for (date, entry) in series {
            let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .ok()
                .zip(entry.get("4. close").and_then(number_field));
            match parsed {
                Some((date, price)) => points.push(PricePoint { date, price }),
                None => tracing::debug!("Skipping malformed monthly entry {} for {}", date, symbol),
            }
        }
        Ok(Some(points))
    }
}

#[async_trait]
impl MarketData for AlphaVantageService {
    async fn search_symbol(&self, company_name: &str) -> Result<Option<String>, AppError> {
        tracing::info!("Alpha Vantage: searching symbol for '{}'", company_name);
        let data = match self
            .query(&[("function", "SYMBOL_SEARCH"), ("keywords", company_name)])
            .await?
        {
            Some(data) => data,
            None => return Ok(None),
        };
        Ok(data
            .get("bestMatches")
            .and_then(|m| m.get(0))
            .and_then(|m| m.get("1. symbol"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn stock_snapshot(&self, symbol: &str) -> Result<Option<StockSeries>, AppError> {
        tracing::info!("Alpha Vantage: fetching quote and history for {}", symbol);
        let current_price = match self.current_price(symbol).await? {
            Some(price) => price,
            None => return Ok(None),
        };
        let history = match self.monthly_history(symbol).await? {
            Some(history) => history,
            None => return Ok(None),
        };
        let series = StockSeries::new(current_price, history);
        tracing::info!(
            "Alpha Vantage: {} at {} with {} monthly closes",
            symbol,
            series.current_price,
            series.history.len()
        );
        Ok(Some(series))
    }
}

/// Alpha Vantage sends numbers as strings.
fn number_field(value: &Value) -> Option<f64> {
    let number: Option<f64> = match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

pub struct NewsApiService {
    client: Client,
    base_url: String,
    api_key: String,
    page_size: usize,
}

impl NewsApiService {
    /// Creates a new NewsAPI client.
    ///
    /// # Arguments
    ///
    /// * `client` - Shared HTTP client.
    /// * `config` - Supplies the endpoint URL, API key and page size.
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.news_api_url.clone(),
            api_key: config.news_api_key.clone(),
            page_size: config.news_page_size,
        }
    }
}

#[async_trait]
impl NewsFeed for NewsApiService {
    async fn headlines(&self, query: &str) -> Result<Option<NewsDigest>, AppError> {
        let page_size = self.page_size.to_string();
        let url = reqwest::Url::parse_with_params(
            &self.base_url,
            &[
                ("q", query),
                ("apiKey", self.api_key.as_str()),
                ("pageSize", page_size.as_str()),
                ("sortBy", "relevance"),
            ],
        )
        .map_err(|e| AppError::ExternalApiError(format!("Failed to build NewsAPI URL: {}", e)))?;

        tracing::info!("NewsAPI: fetching headlines for '{}'", query);
        tracing::debug!(
            "NewsAPI URL: {}?q={}&apiKey=[REDACTED]&pageSize={}&sortBy=relevance",
            self.base_url,
            query,
            page_size
        );

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("NewsAPI request failed: {}", e)))?;

        if !response.status().is_success() {
            tracing::warn!("NewsAPI returned status {}", response.status());
            return Ok(None);
        }

        let data: Value = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse NewsAPI response: {}", e))
        })?;

        let articles: Vec<NewsItem> = data
            .get("articles")
            .and_then(Value::as_array)
            .map(|articles| {
                articles
                    .iter()
                    .filter_map(|a| {
                        Some(NewsItem {
                            title: a.get("title")?.as_str()?.to_string(),
                            url: a.get("url")?.as_str()?.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        tracing::info!("NewsAPI: {} articles for '{}'", articles.len(), query);
        Ok(Some(NewsDigest::new(articles, self.page_size)))
    }
}

/// Company list scraped from a stock directory page, cached for an hour.
pub struct StockAnalysisDirectory {
    client: Client,
    url: String,
    cache: Cache<String, Arc<Vec<CompanySuggestion>>>,
}

impl StockAnalysisDirectory {
    /// Creates the directory client with an empty one-hour cache.
    ///
    /// # Arguments
    ///
    /// * `client` - Shared HTTP client.
    /// * `config` - Supplies the directory page URL.
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            url: config.company_directory_url.clone(),
            cache: Cache::builder()
                .time_to_live(DIRECTORY_TTL)
                .max_capacity(1)
                .build(),
        }
    }

    async fn listing(&self) -> Result<Arc<Vec<CompanySuggestion>>, AppError> {
        if let Some(cached) = self.cache.get(DIRECTORY_CACHE_KEY).await {
            return Ok(cached);
        }

        tracing::info!("Fetching company directory from {}", self.url);
        let response = self.client.get(&self.url).send().await.map_err(|e| {
            AppError::ExternalApiError(format!("Company directory request failed: {}", e))
        })?;
        if !response.status().is_success() {
            return Err(AppError::ExternalApiError(format!(
                "Company directory returned status {}",
                response.status()
            )));
        }
        let html = response.text().await?;
        let companies = Arc::new(parse_directory(&html)?);
        tracing::info!("Company directory loaded: {} entries", companies.len());

        self.cache
            .insert(DIRECTORY_CACHE_KEY.to_string(), Arc::clone(&companies))
            .await;
        Ok(companies)
    }
}

#[async_trait]
impl CompanyDirectory for StockAnalysisDirectory {
    async fn suggestions(&self, input: &str) -> Vec<CompanySuggestion> {
        match self.listing().await {
            Ok(companies) => filter_companies(&companies, input),
            Err(e) => {
                tracing::error!("Error fetching company suggestions: {}", e);
                Vec::new()
            }
        }
    }
}

/// Extracts `(symbol, name)` pairs from anchors pointing under `/stocks/`.
///
/// # Arguments
///
/// * `html` - The directory page.
///
/// # Returns
///
/// * `Result<Vec<CompanySuggestion>, AppError>` - Companies in page order. Anchors whose
///   last path segment is not a 1-5 letter ticker are skipped.
pub fn parse_directory(html: &str) -> Result<Vec<CompanySuggestion>, AppError> {
    use scraper::{Html, Selector};

    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"a[href^="/stocks/"]"#)
        .map_err(|e| AppError::InternalError(format!("Invalid directory selector: {}", e)))?;
    let ticker = Regex::new(r"^[A-Z]{1,5}$")
        .map_err(|e| AppError::InternalError(format!("Invalid ticker pattern: {}", e)))?;

    let companies = document
        .select(&selector)
        .filter_map(|link| {
            let href = link.value().attr("href")?;
            let symbol = href
                .trim_start_matches("/stocks/")
                .split('/')
                .filter(|segment| !segment.is_empty())
                .last()?
                .to_uppercase();
            if !ticker.is_match(&symbol) {
                return None;
            }
            let name = link.text().collect::<Vec<_>>().join("").trim().to_string();
            Some(CompanySuggestion { symbol, name })
        })
        .collect();
    Ok(companies)
}

/// Case-insensitive match on name or symbol, in listing order.
pub fn filter_companies(companies: &[CompanySuggestion], input: &str) -> Vec<CompanySuggestion> {
    let needle = input.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    companies
        .iter()
        .filter(|c| {
            c.name.to_lowercase().contains(&needle) || c.symbol.to_lowercase().contains(&needle)
        })
        .take(MAX_SUGGESTIONS)
        .cloned()
        .collect()
}
