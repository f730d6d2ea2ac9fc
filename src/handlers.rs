use crate::config::Config;
use crate::errors::AppError;
use crate::models::{AgencyInfo, PredictResponse, StatementsResponse};
use crate::narrative::NarrativeGenerator;
use crate::orchestrator::{predict_workflow, search_workflow, statements_workflow, SearchOutcome};
use crate::ratios::StatementBundle;
use crate::scoring::{Agency, Ensemble};
use crate::services::{CompanyDirectory, MarketData, NewsFeed};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Pre-trained models, loaded once at startup.
    pub ensemble: Arc<Ensemble>,
    /// Quotes, monthly history and symbol search.
    pub market: Arc<dyn MarketData>,
    pub news: Arc<dyn NewsFeed>,
    /// Company-name suggestions for ambiguous searches.
    pub directory: Arc<dyn CompanyDirectory>,
    pub narrator: Arc<dyn NarrativeGenerator>,
}

/// Routes served behind the rate limiter. `/health` is mounted separately.
///
/// # Arguments
///
/// * `max_upload_bytes` - Request body cap applied to every route, including `/upload`.
///
/// # Returns
///
/// * `Router<Arc<AppState>>` - The API router, still awaiting its state.
pub fn api_routes(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route("/agencies", get(agencies))
        .route("/predict", post(predict))
        .route("/search/:input", get(search))
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

/// Health check endpoint.
///
/// Returns the service status, name and crate version.
///
/// # Returns
///
/// * `(StatusCode, Json<Value>)` - HTTP 200 OK with health status JSON.
pub async fn health() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-finrisk-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// GET /agencies
///
/// Lists the supported credit agencies and their inclusive score ranges.
///
/// # Returns
///
/// * `Json<Vec<AgencyInfo>>` - One entry per agency, in declaration order.
pub async fn agencies() -> Json<Vec<AgencyInfo>> {
    Json(Agency::ALL.into_iter().map(AgencyInfo::from).collect())
}

/// POST /predict
///
/// Scores a credit profile with the six-model ensemble. The body is parsed here rather
/// than by the `Json` extractor so that every malformed payload gets the same
/// `{"error": ...}` shape.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `body` - Raw JSON body with `agency`, `credit_score` and optional feature fields.
///
/// # Returns
///
/// * `Result<Json<PredictResponse>, AppError>` - Per-model labels, average, category and
///   summary, or a 400 naming the violated constraint.
pub async fn predict(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<PredictResponse>, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::BadRequest("Input data is required.".to_string()));
    }
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {}", e)))?;

    tracing::info!("POST /predict");
    let response = predict_workflow(&state, &payload).await?;
    Ok(Json(response))
}

/// GET /search/:input
///
/// Resolves a ticker or company name and returns market data, news, an investment
/// assessment and a narrative, or a suggestion list for ambiguous names.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `input` - A ticker or free-text company name.
///
/// # Returns
///
/// * `Result<Response, AppError>` - A `SearchResponse` or `SuggestionsResponse`, or a 404
///   naming the stage that had no data.
pub async fn search(
    State(state): State<Arc<AppState>>,
    Path(input): Path<String>,
) -> Result<Response, AppError> {
    tracing::info!("GET /search/{}", input);
    let response = match search_workflow(&state, &input).await? {
        SearchOutcome::Suggestions(suggestions) => Json(suggestions).into_response(),
        SearchOutcome::Report(report) => Json(*report).into_response(),
    };
    Ok(response)
}

/// POST /upload
///
/// Accepts up to four CSV statements as multipart fields (`balance_sheet`, `cash_flow`,
/// `financials`, `historical`). Empty parts are treated as not uploaded.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `multipart` - The form carrying the statement files.
///
/// # Returns
///
/// * `Result<Json<StatementsResponse>, AppError>` - Per-section results and a summary.
///   Section failures are reported inside the body; only a broken form is a 400.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<StatementsResponse>, AppError> {
    let mut bundle = StatementBundle::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        let slot = match name.as_str() {
            "balance_sheet" => &mut bundle.balance_sheet,
            "cash_flow" => &mut bundle.cash_flow,
            "financials" => &mut bundle.financials,
            "historical" => &mut bundle.historical,
            other => {
                tracing::debug!("Ignoring unexpected upload field '{}'", other);
                continue;
            }
        };
        let bytes = field.bytes().await?;
        tracing::debug!("Upload field '{}': {} bytes", name, bytes.len());
        if !bytes.is_empty() {
            *slot = Some(bytes.to_vec());
        }
    }

    tracing::info!(
        "POST /upload - balance_sheet={} cash_flow={} financials={} historical={}",
        bundle.balance_sheet.is_some(),
        bundle.cash_flow.is_some(),
        bundle.financials.is_some(),
        bundle.historical.is_some()
    );

    let response = statements_workflow(&state, &bundle).await?;
    Ok(Json(response))
}
