use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use rust_finrisk_api::artifacts::ModelStore;
use rust_finrisk_api::config::Config;
use rust_finrisk_api::handlers::{self, AppState};
use rust_finrisk_api::narrative::GeminiClient;
use rust_finrisk_api::scoring::Ensemble;
use rust_finrisk_api::services::{AlphaVantageService, NewsApiService, StockAnalysisDirectory};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the application.
///
/// Initializes logging, loads configuration and the model artifacts, builds the
/// external clients, and serves the HTTP API.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_finrisk_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Models are immutable for the life of the process
    let store = ModelStore::load(&config.artifacts_dir)?;
    tracing::info!(
        "Loaded {} artifacts from {}",
        store.fingerprints.len(),
        config.artifacts_dir.display()
    );
    let ensemble = Arc::new(Ensemble::from_store(store)?);

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()?;

    let app_state = Arc::new(AppState {
        config: config.clone(),
        ensemble,
        market: Arc::new(AlphaVantageService::new(http.clone(), &config)),
        news: Arc::new(NewsApiService::new(http.clone(), &config)),
        directory: Arc::new(StockAnalysisDirectory::new(http.clone(), &config)),
        narrator: Arc::from(GeminiClient::from_config(http, &config)),
    });

    // 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limiter configuration"))?,
    );

    let protected_routes = handlers::api_routes(config.max_upload_bytes).layer(
        ServiceBuilder::new()
            .layer(RequestBodyLimitLayer::new(config.max_upload_bytes))
            .layer(GovernorLayer {
                config: governor_conf,
            }),
    );

    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_str(&config.cors_origin)?)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
