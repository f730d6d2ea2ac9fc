//! Financial statement analysis.
//!
//! Up to four CSV uploads are reduced independently. A section whose file is absent
//! serializes as `{}`, a section that cannot be computed carries its own error, and the
//! other sections are unaffected either way.

use crate::chart::{render_price_chart_base64, CHART_FORMAT};
use crate::normalize::{parse_calendar_date, serialize_ratio, Scalar};
use crate::table::{Table, TableError};
use chrono::NaiveDate;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fmt;

pub const NET_TANGIBLE_ASSETS: &str = "Net Tangible Assets";
pub const TOTAL_DEBT: &str = "Total Debt";
pub const CASH_AND_EQUIVALENTS: &str = "Cash And Cash Equivalents";
pub const WORKING_CAPITAL: &str = "Working Capital";
pub const FREE_CASH_FLOW: &str = "Free Cash Flow";
pub const GROSS_PROFIT: &str = "Gross Profit";
pub const OPERATING_INCOME: &str = "Operating Income";
pub const DATE: &str = "Date";
pub const CLOSE: &str = "Close";

pub const CHART_EXPLANATION: &str = "This chart displays the historical closing prices over time. \
It helps visualize trends, identify peaks and troughs, and assess market behavior.";

/// Raw uploaded files, each optional.
#[derive(Debug, Clone, Default)]
pub struct StatementBundle {
    pub balance_sheet: Option<Vec<u8>>,
    pub cash_flow: Option<Vec<u8>>,
    pub financials: Option<Vec<u8>>,
    pub historical: Option<Vec<u8>>,
}

impl StatementBundle {
    pub fn is_empty(&self) -> bool {
        self.balance_sheet.is_none()
            && self.cash_flow.is_none()
            && self.financials.is_none()
            && self.historical.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_columns: Option<Vec<String>>,
}

impl SectionError {
    fn new(section: &str, err: TableError) -> Self {
        match err {
            TableError::MissingColumns(columns) => Self {
                error: format!("Missing columns in {}: {}", section, columns.join(", ")),
                missing_columns: Some(columns),
            },
            other => Self::message(format!("Error processing {}: {}", section, other)),
        }
    }

    fn message(error: String) -> Self {
        Self {
            error,
            missing_columns: None,
        }
    }
}

impl fmt::Display for SectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.error)
    }
}

/// Outcome of one report section.
#[derive(Debug, Clone, PartialEq)]
pub enum Section<T> {
    /// No file was uploaded for this section.
    Absent,
    Ready(T),
    Failed(SectionError),
}

impl<T> Section<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Section::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn failed(&self) -> Option<&SectionError> {
        match self {
            Section::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Section::Absent)
    }

    fn from_result(result: Result<T, SectionError>) -> Self {
        match result {
            Ok(value) => Section::Ready(value),
            Err(err) => Section::Failed(err),
        }
    }
}

impl<T: Serialize> Serialize for Section<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Section::Absent => serializer.serialize_map(Some(0))?.end(),
            Section::Ready(value) => value.serialize(serializer),
            Section::Failed(err) => err.serialize(serializer),
        }
    }
}

/// First-row balance sheet figures. Only one period is read; later rows are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BalanceSheet {
    pub total_assets: f64,
    pub total_liabilities: f64,
    pub current_assets: f64,
    pub current_liabilities: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LiquidityReport {
    #[serde(serialize_with = "serialize_ratio")]
    pub net_debt: f64,
    #[serde(serialize_with = "serialize_ratio")]
    pub current_working_capital: f64,
    #[serde(serialize_with = "serialize_ratio")]
    pub quick_ratio: f64,
    #[serde(serialize_with = "serialize_ratio")]
    pub cash_ratio: f64,
}

/// Column totals keep integer precision when every summed cell is an integer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CashFlowInsights {
    pub free_cash_flow: Scalar,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncomeInsights {
    pub gross_profit: Scalar,
    pub operating_income: Scalar,
}

/// Wraps figures under an `insights` key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Insights<T> {
    pub insights: T,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalChart {
    /// Base64-encoded SVG.
    pub chart: String,
    pub explanation: String,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementReport {
    pub liquidity_analysis: Section<LiquidityReport>,
    pub balance_sheet: Section<BalanceSheet>,
    pub cash_flow: Section<Insights<CashFlowInsights>>,
    pub financials_data: Section<Insights<IncomeInsights>>,
    pub historical_chart: Section<HistoricalChart>,
}

/// Runs every section whose file is present.
pub fn analyze(bundle: &StatementBundle) -> StatementReport {
    let balance_sheet = section(bundle.balance_sheet.as_deref(), "balance sheet", |table| {
        read_balance_sheet(table)
    });
    let liquidity_analysis = match balance_sheet.ready() {
        Some(sheet) => Section::Ready(liquidity(sheet)),
        None => Section::Absent,
    };

    let cash_flow = section(bundle.cash_flow.as_deref(), "cash flow", |table| {
        Ok(Insights {
            insights: CashFlowInsights {
                free_cash_flow: table.sum(FREE_CASH_FLOW)?,
            },
        })
    });

    let financials_data = section(bundle.financials.as_deref(), "financials data", |table| {
        table.require(&[GROSS_PROFIT, OPERATING_INCOME])?;
        Ok(Insights {
            insights: IncomeInsights {
                gross_profit: table.sum(GROSS_PROFIT)?,
                operating_income: table.sum(OPERATING_INCOME)?,
            },
        })
    });

    let historical_chart = match bundle.historical.as_deref() {
        None => Section::Absent,
        Some(bytes) => Section::from_result(historical_chart(bytes)),
    };

    for (name, failure) in [
        ("balance_sheet", balance_sheet.failed()),
        ("cash_flow", cash_flow.failed()),
        ("financials_data", financials_data.failed()),
        ("historical_chart", historical_chart.failed()),
    ] {
        if let Some(err) = failure {
            tracing::warn!("Statement section {} failed: {}", name, err);
        }
    }

    StatementReport {
        liquidity_analysis,
        balance_sheet,
        cash_flow,
        financials_data,
        historical_chart,
    }
}

fn section<T, F>(bytes: Option<&[u8]>, name: &str, reduce: F) -> Section<T>
where
    F: FnOnce(&Table) -> Result<T, TableError>,
{
    match bytes {
        None => Section::Absent,
        Some(bytes) => Section::from_result(
            Table::from_csv(bytes)
                .and_then(|table| reduce(&table))
                .map_err(|e| SectionError::new(name, e)),
        ),
    }
}

pub fn read_balance_sheet(table: &Table) -> Result<BalanceSheet, TableError> {
    table.require(&[
        NET_TANGIBLE_ASSETS,
        TOTAL_DEBT,
        CASH_AND_EQUIVALENTS,
        WORKING_CAPITAL,
    ])?;
    Ok(BalanceSheet {
        total_assets: table.first_number(NET_TANGIBLE_ASSETS)?,
        total_liabilities: table.first_number(TOTAL_DEBT)?,
        current_assets: table.first_number(CASH_AND_EQUIVALENTS)?,
        current_liabilities: -table.first_number(WORKING_CAPITAL)?,
    })
}

/// Liquidity ratios; a zero or negative denominator gives `+inf` instead of an error.
pub fn liquidity(sheet: &BalanceSheet) -> LiquidityReport {
    LiquidityReport {
        net_debt: sheet.total_liabilities - sheet.current_assets,
        current_working_capital: sheet.current_assets + sheet.current_liabilities,
        quick_ratio: ratio(sheet.current_assets, sheet.current_liabilities),
        cash_ratio: ratio(sheet.current_assets, sheet.total_liabilities),
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        f64::INFINITY
    }
}

/// `(date, close)` pairs in file order. Any unparseable row fails the whole series.
pub fn read_price_history(table: &Table) -> Result<Vec<(NaiveDate, f64)>, SectionError> {
    table
        .require(&[DATE, CLOSE])
        .map_err(|e| SectionError::new("historical data", e))?;
    let dates = table
        .column(DATE)
        .map_err(|e| SectionError::new("historical data", e))?;
    let closes = table
        .column(CLOSE)
        .map_err(|e| SectionError::new("historical data", e))?;

    let mut points = Vec::with_capacity(table.len());
    for (row, (date, close)) in dates.iter().zip(closes).enumerate() {
        let raw_date = date.to_string();
        let date = parse_calendar_date(&raw_date).ok_or_else(|| {
            SectionError::message(format!(
                "Error processing historical data: unparseable date '{}' in row {}",
                raw_date,
                row + 1
            ))
        })?;
        let close = close.as_f64().ok_or_else(|| {
            SectionError::message(format!(
                "Error processing historical data: non-numeric close '{}' in row {}",
                close,
                row + 1
            ))
        })?;
        points.push((date, close));
    }
    Ok(points)
}

fn historical_chart(bytes: &[u8]) -> Result<HistoricalChart, SectionError> {
    let table =
        Table::from_csv(bytes).map_err(|e| SectionError::new("historical data", e))?;
    let points = read_price_history(&table)?;
    let chart = render_price_chart_base64(&points).map_err(|e| {
        SectionError::message(format!("Error processing historical data: {}", e))
    })?;
    tracing::debug!("Rendered historical chart from {} points", points.len());
    Ok(HistoricalChart {
        chart,
        explanation: CHART_EXPLANATION.to_string(),
        format: CHART_FORMAT.to_string(),
    })
}
