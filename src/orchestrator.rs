//! Request workflows shared by the HTTP handlers.
//!
//! Each workflow sequences the collaborators around one analytical engine:
//! 1. `/search`: resolve symbol, fetch quote and history, fetch news, assess, narrate
//! 2. `/predict`: validate profile, score with the ensemble, narrate
//! 3. `/upload`: analyze statements, narrate
//!
//! A missing intermediate result stops the search chain with a `NotFound` naming the
//! stage; narratives never fail a workflow.

use crate::errors::{AppError, ResultExt};
use crate::handlers::AppState;
use crate::investment::assess;
use crate::models::{
    CompanySuggestion, PredictResponse, SearchResponse, StatementsResponse, SuggestionsResponse,
};
use crate::narrative::{
    credit_prompt, generate_or, liquidity_fallback, liquidity_prompt, search_prompt,
    CREDIT_FALLBACK, SEARCH_FALLBACK,
};
use crate::ratios::{analyze, StatementBundle};
use crate::scoring::CreditProfile;
use crate::services::{CompanyDirectory, MarketData};
use serde_json::Value;

/// Whether the input already looks like a ticker: at most five characters, with
/// uppercase letters and no lowercase ones.
pub fn is_symbol(input: &str) -> bool {
    let input = input.trim();
    input.chars().count() <= 5
        && input.chars().any(|c| c.is_uppercase())
        && !input.chars().any(|c| c.is_lowercase())
}

#[derive(Debug, Clone, PartialEq)]
pub enum SymbolResolution {
    Symbol(String),
    /// The input was an ambiguous name; the caller should pick one.
    Suggestions(Vec<CompanySuggestion>),
}

/// Maps free text to a ticker. Plausible tickers are taken as-is without consulting
/// either collaborator.
///
/// # Arguments
///
/// * `input` - A ticker or company name as typed by the user.
/// * `directory` - Consulted first for name suggestions.
/// * `market` - Symbol search, used only when the directory has nothing.
///
/// # Returns
///
/// * `Result<SymbolResolution, AppError>` - The ticker or a suggestion list; `NotFound`
///   when neither collaborator knows the name.
pub async fn resolve_symbol(
    input: &str,
    directory: &dyn CompanyDirectory,
    market: &dyn MarketData,
) -> Result<SymbolResolution, AppError> {
    if is_symbol(input) {
        tracing::debug!("'{}' treated as a ticker", input);
        return Ok(SymbolResolution::Symbol(input.trim().to_string()));
    }

    let suggestions = directory.suggestions(input).await;
    if !suggestions.is_empty() {
        tracing::info!("{} directory suggestions for '{}'", suggestions.len(), input);
        return Ok(SymbolResolution::Suggestions(suggestions));
    }

    match market
        .search_symbol(input)
        .await
        .context("symbol search")?
    {
        Some(symbol) => {
            tracing::info!("Resolved '{}' to {}", input, symbol);
            Ok(SymbolResolution::Symbol(symbol))
        }
        None => Err(AppError::NotFound(
            "Stock symbol not found for the given company name".to_string(),
        )),
    }
}

#[derive(Debug, Clone)]
pub enum SearchOutcome {
    Suggestions(SuggestionsResponse),
    Report(Box<SearchResponse>),
}

/// Runs the `/search` chain: resolve, quote and history, news, assessment, narrative.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `input` - A ticker or company name.
///
/// # Returns
///
/// * `Result<SearchOutcome, AppError>` - Suggestions or a full report. Stops with
///   `NotFound` at the first stage without data, before any later collaborator is called.
pub async fn search_workflow(state: &AppState, input: &str) -> Result<SearchOutcome, AppError> {
    tracing::info!("Search workflow started for '{}'", input);

    let symbol = match resolve_symbol(input, state.directory.as_ref(), state.market.as_ref()).await? {
        SymbolResolution::Symbol(symbol) => symbol,
        SymbolResolution::Suggestions(suggestions) => {
            return Ok(SearchOutcome::Suggestions(SuggestionsResponse { suggestions }))
        }
    };

    let series = state
        .market
        .stock_snapshot(&symbol)
        .await
        .with_context(|| format!("stock data for {}", symbol))?
        .ok_or_else(|| AppError::NotFound("Stock data not found".to_string()))?;

    let news = state
        .news
        .headlines(&symbol)
        .await
        .with_context(|| format!("news for {}", symbol))?
        .filter(|digest| !digest.is_empty())
        .ok_or_else(|| AppError::NotFound("News articles not found".to_string()))?;

    let assessment = match assess(&series, &news) {
        Ok(assessment) => {
            tracing::info!(
                "{}: growth {:.2}% -> {}",
                symbol,
                assessment.growth_rate,
                assessment.verdict
            );
            Some(assessment)
        }
        Err(e) => {
            tracing::warn!("No investment assessment for {}: {}", symbol, e);
            None
        }
    };

    let gemini_summary = generate_or(
        state.narrator.as_ref(),
        &search_prompt(&symbol, &series, &news),
        SEARCH_FALLBACK,
    )
    .await;

    Ok(SearchOutcome::Report(Box::new(SearchResponse {
        input: input.to_string(),
        stock_symbol: symbol,
        current_price: series.current_price,
        historical_data: series.history,
        news: news.articles,
        assessment,
        gemini_summary,
    })))
}

/// Validates a credit payload, scores it and attaches a narrative.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `payload` - The parsed `/predict` body.
///
/// # Returns
///
/// * `Result<PredictResponse, AppError>` - The prediction and summary, or a `BadRequest`.
pub async fn predict_workflow(state: &AppState, payload: &Value) -> Result<PredictResponse, AppError> {
    let profile = CreditProfile::from_payload(payload)?;
    tracing::info!(
        "Scoring {} profile (score {}, standardized {:.3})",
        profile.agency,
        profile.credit_score,
        profile.standardized_score
    );

    let prediction = state.ensemble.score(&profile)?;
    tracing::info!(
        "Ensemble result: {} (average {:.2})",
        prediction.risk_category,
        prediction.average_score
    );

    let summary = generate_or(
        state.narrator.as_ref(),
        &credit_prompt(&prediction, profile.agency),
        CREDIT_FALLBACK,
    )
    .await;

    Ok(PredictResponse {
        prediction,
        summary,
    })
}

/// Analyzes uploaded statements and summarizes the report.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `bundle` - Whichever statement files were uploaded.
///
/// # Returns
///
/// * `Result<StatementsResponse, AppError>` - Always a report; a failed summary becomes an
///   inline error note.
pub async fn statements_workflow(
    state: &AppState,
    bundle: &StatementBundle,
) -> Result<StatementsResponse, AppError> {
    let report = analyze(bundle);

    let report_json = serde_json::to_string(&report)
        .map_err(|e| AppError::InternalError(format!("Failed to serialize report: {}", e)))?;

    let summary = match state.narrator.generate(&liquidity_prompt(&report_json)).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("Statement summary failed: {}", e);
            liquidity_fallback(&e)
        }
    };

    Ok(StatementsResponse { report, summary })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::investment::StockSeries;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDirectory {
        calls: AtomicUsize,
        results: Vec<CompanySuggestion>,
    }

    #[async_trait]
    impl CompanyDirectory for CountingDirectory {
        async fn suggestions(&self, _input: &str) -> Vec<CompanySuggestion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results.clone()
        }
    }

    struct CountingMarket {
        calls: AtomicUsize,
        symbol: Option<String>,
    }

    #[async_trait]
    impl MarketData for CountingMarket {
        async fn search_symbol(&self, _name: &str) -> Result<Option<String>, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.symbol.clone())
        }

        async fn stock_snapshot(&self, _symbol: &str) -> Result<Option<StockSeries>, AppError> {
            Ok(None)
        }
    }

    fn directory(results: Vec<CompanySuggestion>) -> CountingDirectory {
        CountingDirectory {
            calls: AtomicUsize::new(0),
            results,
        }
    }

    fn market(symbol: Option<&str>) -> CountingMarket {
        CountingMarket {
            calls: AtomicUsize::new(0),
            symbol: symbol.map(str::to_string),
        }
    }

    #[test]
    fn test_is_symbol() {
        assert!(is_symbol("AAPL"));
        assert!(is_symbol("BRK.B"));
        assert!(is_symbol(" MSFT "));
        assert!(!is_symbol("Apple"));
        assert!(!is_symbol("GOOGLE"));
        assert!(!is_symbol("123"));
        assert!(!is_symbol(""));
    }

    #[tokio::test]
    async fn test_ticker_bypasses_lookup() {
        let dir = directory(vec![CompanySuggestion {
            symbol: "AAPL".into(),
            name: "Apple Inc.".into(),
        }]);
        let mkt = market(Some("XXX"));
        let resolved = resolve_symbol("AAPL", &dir, &mkt).await.unwrap();
        assert_eq!(resolved, SymbolResolution::Symbol("AAPL".into()));
        assert_eq!(dir.calls.load(Ordering::SeqCst), 0);
        assert_eq!(mkt.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_name_with_matches_returns_suggestions() {
        let dir = directory(vec![CompanySuggestion {
            symbol: "AAPL".into(),
            name: "Apple Inc.".into(),
        }]);
        let mkt = market(Some("AAPL"));
        let resolved = resolve_symbol("apple", &dir, &mkt).await.unwrap();
        assert!(matches!(resolved, SymbolResolution::Suggestions(ref s) if s.len() == 1));
        assert_eq!(mkt.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_name_falls_back_to_symbol_search() {
        let dir = directory(Vec::new());
        let resolved = resolve_symbol("tesla motors", &dir, &market(Some("TSLA")))
            .await
            .unwrap();
        assert_eq!(resolved, SymbolResolution::Symbol("TSLA".into()));

        let err = resolve_symbol("nothing here", &dir, &market(None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m.contains("Stock symbol not found")));
    }
}
