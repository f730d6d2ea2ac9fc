//! Prose generation for the analytical results.
//!
//! The generator is a black box that either returns text or fails; every caller has a
//! fixed fallback, so a narrative failure never fails the surrounding request.

use crate::circuit_breaker::{create_upstream_circuit_breaker, UpstreamBreaker};
use crate::config::Config;
use crate::errors::AppError;
use crate::investment::{NewsDigest, StockSeries};
use crate::scoring::{Agency, EnsemblePrediction};
use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as _;
use reqwest::Client;
use serde_json::{json, Value};

pub const CREDIT_FALLBACK: &str = "No advice available.";
pub const SEARCH_FALLBACK: &str = "No summary available.";

#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, AppError>;
}

/// Used when no API key is configured; every call fails so callers fall back.
pub struct DisabledNarrative;

#[async_trait]
impl NarrativeGenerator for DisabledNarrative {
    async fn generate(&self, _prompt: &str) -> Result<String, AppError> {
        Err(AppError::ExternalApiError(
            "narrative generation is disabled (GOOGLE_API_KEY not set)".to_string(),
        ))
    }
}

/// Client for the Gemini `generateContent` REST endpoint.
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    breaker: UpstreamBreaker,
}

impl GeminiClient {
    pub fn new(client: Client, base_url: String, model: String, api_key: String) -> Self {
        Self {
            client,
            base_url,
            model,
            api_key,
            breaker: create_upstream_circuit_breaker(),
        }
    }

    /// A Gemini client when a key is configured, otherwise [`DisabledNarrative`].
    pub fn from_config(client: Client, config: &Config) -> Box<dyn NarrativeGenerator> {
        match &config.gemini_api_key {
            Some(key) => {
                tracing::info!("Narrative generation enabled ({})", config.gemini_model);
                Box::new(Self::new(
                    client,
                    config.gemini_base_url.clone(),
                    config.gemini_model.clone(),
                    key.clone(),
                ))
            }
            None => {
                tracing::warn!("GOOGLE_API_KEY not set; narratives will use fallback text");
                Box::new(DisabledNarrative)
            }
        }
    }

    async fn request(&self, prompt: &str) -> Result<String, AppError> {
        let url = reqwest::Url::parse_with_params(
            &format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ),
            &[("key", self.api_key.as_str())],
        )
        .map_err(|e| AppError::ExternalApiError(format!("Failed to build Gemini URL: {}", e)))?;

        tracing::debug!(
            "Gemini URL: {}/v1beta/models/{}:generateContent?key=[REDACTED] ({} prompt chars)",
            self.base_url,
            self.model,
            prompt.len()
        );

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Gemini request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Gemini returned {}: {}",
                status, error_text
            )));
        }

        let data: Value = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse Gemini response: {}", e))
        })?;

        candidate_text(&data).ok_or_else(|| {
            AppError::ExternalApiError("Gemini response contained no text".to_string())
        })
    }
}

#[async_trait]
impl NarrativeGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, AppError> {
        match self.breaker.call(self.request(prompt)).await {
            Ok(text) => Ok(text),
            Err(failsafe::Error::Inner(e)) => Err(e),
            Err(failsafe::Error::Rejected) => Err(AppError::ExternalApiError(
                "Gemini circuit open; skipping request".to_string(),
            )),
        }
    }
}

/// Text of the first part of the first candidate.
fn candidate_text(data: &Value) -> Option<String> {
    data.get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
}

/// Generated text, or `fallback` when generation fails.
pub async fn generate_or(narrator: &dyn NarrativeGenerator, prompt: &str, fallback: &str) -> String {
    match narrator.generate(prompt).await {
        Ok(text) => {
            tracing::info!("Narrative generated ({} chars)", text.len());
            text
        }
        Err(e) => {
            tracing::warn!("Narrative generation failed, using fallback: {}", e);
            fallback.to_string()
        }
    }
}

/// Inline note used in place of the statement summary.
pub fn liquidity_fallback(reason: &AppError) -> String {
    format!("Error summarizing financial data: {}", reason)
}

pub fn credit_prompt(prediction: &EnsemblePrediction, agency: Agency) -> String {
    format!(
        "The credit risk is {} based on an average prediction score of {:.2}. \
         Provide a detailed credit suggestion and a concise and in depth summary advice in \
         Markdown format with clear subheadings and bullet points for improving financial \
         stability and reducing risks, taking into account the credit score provided by {}. \
         Make the advice UK focused but do not mention the UK in the output.",
        prediction.risk_category, prediction.average_score, agency
    )
}

pub fn search_prompt(symbol: &str, series: &StockSeries, news: &NewsDigest) -> String {
    let history: Vec<String> = series
        .history
        .iter()
        .map(|p| format!("({}, {})", p.date, p.price))
        .collect();
    let headlines: Vec<&str> = news.headlines().collect();
    format!(
        "The stock market data for {} shows a current price of {} and a 5-year trend of \
         historical prices. The historical prices are: [{}]. The news headlines related to this \
         stock are: {:?}. Provide a detailed investment suggestion and a concise and in-depth \
         summary in Markdown format with clear subheadings and bullet points. Discount the \
         temporary market-wide drop of 2020 and weigh the years before and after it.",
        symbol,
        series.current_price,
        history.join(", "),
        headlines
    )
}

pub fn liquidity_prompt(report_json: &str) -> String {
    format!(
        "Summarize the following financial data with a focus on liquidity, cash flow, \
         and other key financial metrics:\n{}",
        report_json
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::investment::{NewsItem, PricePoint};
    use crate::scoring::ModelSlot;
    use chrono::NaiveDate;

    #[test]
    fn test_candidate_text_extraction() {
        let data = json!({
            "candidates": [{ "content": { "parts": [{ "text": "## Summary" }] } }]
        });
        assert_eq!(candidate_text(&data).as_deref(), Some("## Summary"));
        assert_eq!(candidate_text(&json!({ "candidates": [] })), None);
        let blank = json!({ "candidates": [{ "content": { "parts": [{ "text": "  " }] } }] });
        assert_eq!(candidate_text(&blank), None);
    }

    #[tokio::test]
    async fn test_disabled_generator_falls_back() {
        let text = generate_or(&DisabledNarrative, "prompt", CREDIT_FALLBACK).await;
        assert_eq!(text, CREDIT_FALLBACK);
    }

    #[test]
    fn test_credit_prompt_embeds_category_and_score() {
        let prediction = EnsemblePrediction::from_labels(
            ModelSlot::ALL.iter().map(|slot| (*slot, 1)).collect(),
        );
        let prompt = credit_prompt(&prediction, Agency::Equifax);
        assert!(prompt.contains("High Risk"));
        assert!(prompt.contains("1.00"));
        assert!(prompt.contains("Equifax"));
    }

    #[test]
    fn test_search_prompt_lists_history_and_headlines() {
        let series = StockSeries::new(
            190.5,
            vec![PricePoint {
                date: NaiveDate::from_ymd_opt(2024, 3, 28).unwrap(),
                price: 171.48,
            }],
        );
        let news = NewsDigest::new(
            vec![NewsItem {
                title: "Apple ships".to_string(),
                url: "https://n.example/1".to_string(),
            }],
            5,
        );
        let prompt = search_prompt("AAPL", &series, &news);
        assert!(prompt.contains("AAPL"));
        assert!(prompt.contains("190.5"));
        assert!(prompt.contains("(2024-03-28, 171.48)"));
        assert!(prompt.contains("Apple ships"));
    }

    #[test]
    fn test_liquidity_fallback_names_reason() {
        let note = liquidity_fallback(&AppError::ExternalApiError("quota".to_string()));
        assert!(note.starts_with("Error summarizing financial data:"));
        assert!(note.contains("quota"));
    }
}
