//! Growth-rate and news-volume heuristic behind the investment verdict.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Five years of monthly closes.
pub const HISTORY_LIMIT: usize = 60;
/// Growth (in percent) a stock must exceed before it can be rated `Invest`.
pub const INVEST_GROWTH_THRESHOLD: f64 = 20.0;
/// Minimum number of headlines backing an `Invest` verdict.
pub const MIN_NEWS_FOR_INVEST: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

/// Monthly closing prices, stored most-recent-first and capped at [`HISTORY_LIMIT`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockSeries {
    pub current_price: f64,
    pub history: Vec<PricePoint>,
}

impl StockSeries {
    /// Orders the points newest-first and keeps the most recent [`HISTORY_LIMIT`].
    pub fn new(current_price: f64, mut history: Vec<PricePoint>) -> Self {
        history.sort_by(|a, b| b.date.cmp(&a.date));
        history.truncate(HISTORY_LIMIT);
        Self {
            current_price,
            history,
        }
    }

    pub fn oldest(&self) -> Option<&PricePoint> {
        self.history.last()
    }

    pub fn newest(&self) -> Option<&PricePoint> {
        self.history.first()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct NewsDigest {
    pub articles: Vec<NewsItem>,
}

impl NewsDigest {
    pub fn new(mut articles: Vec<NewsItem>, page_size: usize) -> Self {
        articles.truncate(page_size);
        Self { articles }
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    pub fn headlines(&self) -> impl Iterator<Item = &str> {
        self.articles.iter().map(|a| a.title.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Invest,
    Hold,
    Avoid,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Invest => write!(f, "Invest"),
            Verdict::Hold => write!(f, "Hold"),
            Verdict::Avoid => write!(f, "Avoid"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssessmentError {
    /// Fewer than two historical points.
    InsufficientHistory(usize),
    /// The oldest close is zero, so relative growth is undefined.
    ZeroBasePrice(NaiveDate),
}

impl fmt::Display for AssessmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssessmentError::InsufficientHistory(n) => write!(
                f,
                "growth rate needs at least 2 historical prices, got {}",
                n
            ),
            AssessmentError::ZeroBasePrice(date) => {
                write!(f, "closing price on {} is zero; growth rate undefined", date)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvestmentAssessment {
    pub growth_rate: f64,
    pub verdict: Verdict,
    pub rationale: String,
}

/// Percentage change from the oldest to the newest close in the series.
pub fn growth_rate(series: &StockSeries) -> Result<f64, AssessmentError> {
    let (oldest, newest) = match (series.oldest(), series.newest()) {
        (Some(oldest), Some(newest)) if series.history.len() >= 2 => (oldest, newest),
        _ => return Err(AssessmentError::InsufficientHistory(series.history.len())),
    };
    if oldest.price == 0.0 {
        return Err(AssessmentError::ZeroBasePrice(oldest.date));
    }
    Ok((newest.price - oldest.price) / oldest.price * 100.0)
}

pub fn decide(growth_rate: f64, news_count: usize) -> Verdict {
    if growth_rate > INVEST_GROWTH_THRESHOLD && news_count >= MIN_NEWS_FOR_INVEST {
        Verdict::Invest
    } else if growth_rate > 0.0 {
        Verdict::Hold
    } else {
        Verdict::Avoid
    }
}

pub fn assess(
    series: &StockSeries,
    news: &NewsDigest,
) -> Result<InvestmentAssessment, AssessmentError> {
    let growth = growth_rate(series)?;
    let verdict = decide(growth, news.len());
    Ok(InvestmentAssessment {
        growth_rate: growth,
        verdict,
        rationale: rationale(series, growth, news.len(), verdict),
    })
}

fn rationale(series: &StockSeries, growth: f64, news_count: usize, verdict: Verdict) -> String {
    let window = match (series.oldest(), series.newest()) {
        (Some(oldest), Some(newest)) => format!("between {} and {}", oldest.date, newest.date),
        _ => "over the available history".to_string(),
    };
    let reason = match verdict {
        Verdict::Invest => format!(
            "growth above {:.0}% backed by {} recent headlines points to sustained momentum",
            INVEST_GROWTH_THRESHOLD, news_count
        ),
        Verdict::Hold if growth > INVEST_GROWTH_THRESHOLD => format!(
            "growth is strong but only {} recent headline(s) were found, fewer than the {} needed to confirm it",
            news_count, MIN_NEWS_FOR_INVEST
        ),
        Verdict::Hold => format!(
            "the price rose but stayed under the {:.0}% growth bar",
            INVEST_GROWTH_THRESHOLD
        ),
        Verdict::Avoid => "the price did not rise over the period".to_string(),
    };
    format!(
        "Closing price changed {:+.2}% {} with {} recent headline(s). Verdict: {} because {}.",
        growth, window, news_count, verdict, reason
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(prices: &[f64]) -> StockSeries {
        // prices are given oldest-first; one month apart
        let points = prices
            .iter()
            .enumerate()
            .map(|(i, price)| PricePoint {
                date: NaiveDate::from_ymd_opt(2020 + (i as i32 / 12), (i as u32 % 12) + 1, 1)
                    .unwrap(),
                price: *price,
            })
            .collect();
        StockSeries::new(prices.last().copied().unwrap_or(0.0), points)
    }

    fn news(n: usize) -> NewsDigest {
        let articles = (0..n)
            .map(|i| NewsItem {
                title: format!("Headline {}", i),
                url: format!("https://news.example.com/{}", i),
            })
            .collect();
        NewsDigest::new(articles, 5)
    }

    #[test]
    fn test_growth_rate_oldest_to_newest() {
        assert_eq!(growth_rate(&series(&[100.0, 150.0])).unwrap(), 50.0);
        assert_eq!(growth_rate(&series(&[200.0, 120.0, 100.0])).unwrap(), -50.0);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let d1 = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let newest_first = StockSeries::new(
            150.0,
            vec![
                PricePoint { date: d2, price: 150.0 },
                PricePoint { date: d1, price: 100.0 },
            ],
        );
        let oldest_first = StockSeries::new(
            150.0,
            vec![
                PricePoint { date: d1, price: 100.0 },
                PricePoint { date: d2, price: 150.0 },
            ],
        );
        assert_eq!(newest_first, oldest_first);
        assert_eq!(growth_rate(&newest_first).unwrap(), 50.0);
    }

    #[test]
    fn test_history_capped_to_most_recent() {
        let prices: Vec<f64> = (1..=72).map(|p| p as f64).collect();
        let s = series(&prices);
        assert_eq!(s.history.len(), HISTORY_LIMIT);
        assert_eq!(s.newest().unwrap().price, 72.0);
        assert_eq!(s.oldest().unwrap().price, 13.0);
    }

    #[test]
    fn test_decision_rule() {
        assert_eq!(decide(50.0, 3), Verdict::Invest);
        assert_eq!(decide(50.0, 2), Verdict::Hold);
        assert_eq!(decide(20.0, 5), Verdict::Hold);
        assert_eq!(decide(0.5, 0), Verdict::Hold);
        assert_eq!(decide(0.0, 5), Verdict::Avoid);
        assert_eq!(decide(-10.0, 5), Verdict::Avoid);
    }

    #[test]
    fn test_assess_falling_series_is_avoid() {
        let assessment = assess(&series(&[100.0, 90.0]), &news(5)).unwrap();
        assert_eq!(assessment.verdict, Verdict::Avoid);
        assert!(assessment.rationale.contains("-10.00%"));
        assert!(assessment.rationale.contains("Avoid"));
    }

    #[test]
    fn test_assess_rising_series_with_news_is_invest() {
        let assessment = assess(&series(&[100.0, 150.0]), &news(3)).unwrap();
        assert_eq!(assessment.growth_rate, 50.0);
        assert_eq!(assessment.verdict, Verdict::Invest);
        assert!(assessment.rationale.contains("+50.00%"));
    }

    #[test]
    fn test_short_series_rejected() {
        assert_eq!(
            growth_rate(&series(&[])),
            Err(AssessmentError::InsufficientHistory(0))
        );
        assert_eq!(
            assess(&series(&[100.0]), &news(5)),
            Err(AssessmentError::InsufficientHistory(1))
        );
    }

    #[test]
    fn test_zero_base_price_rejected() {
        assert!(matches!(
            growth_rate(&series(&[0.0, 10.0])),
            Err(AssessmentError::ZeroBasePrice(_))
        ));
    }

    #[test]
    fn test_news_digest_capped_to_page_size() {
        assert_eq!(news(8).len(), 5);
    }
}
