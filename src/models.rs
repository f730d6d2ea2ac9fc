use crate::investment::{InvestmentAssessment, NewsItem, PricePoint};
use crate::ratios::StatementReport;
use crate::scoring::{Agency, EnsemblePrediction};
use serde::{Deserialize, Serialize};

/// A company listed in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanySuggestion {
    pub symbol: String,
    pub name: String,
}

/// Returned by `/search` when the input is a name matching several companies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<CompanySuggestion>,
}

/// Full `/search` result for a resolved ticker.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub input: String,
    pub stock_symbol: String,
    pub current_price: f64,
    /// Newest first.
    pub historical_data: Vec<PricePoint>,
    pub news: Vec<NewsItem>,
    /// `None` when the series is too short for a growth rate.
    pub assessment: Option<InvestmentAssessment>,
    pub gemini_summary: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictResponse {
    #[serde(flatten)]
    pub prediction: EnsemblePrediction,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatementsResponse {
    #[serde(flatten)]
    pub report: StatementReport,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgencyInfo {
    pub name: Agency,
    pub min_score: i64,
    pub max_score: i64,
}

impl From<Agency> for AgencyInfo {
    fn from(agency: Agency) -> Self {
        let (min_score, max_score) = agency.range();
        Self {
            name: agency,
            min_score,
            max_score,
        }
    }
}
