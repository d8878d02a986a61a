mod app_state;
mod config;
mod db;
mod models;
mod routes;
mod services;

use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;
use services::{
    extract::NutritionExtractor,
    ingest::ImageIngestor,
    llm::{CompletionClient, OpenAiChat},
    normalize::TextNormalizer,
    ocr::{OcrConfig, ReplicateOcr},
    pipeline::ScanPipeline,
    preprocess,
    storage::S3Store,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing nutriscan server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!("scan_requests_total", "Total scan requests received");
    metrics::describe_counter!("scan_failures_total", "Total scans aborted before completion");
    metrics::describe_histogram!(
        "scan_duration_seconds",
        "End-to-end duration of a completed scan, including OCR polling"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize media storage client
    tracing::info!("Initializing media storage client");
    let storage = S3Store::new(
        &config.media_bucket,
        &config.media_endpoint,
        &config.media_access_key,
        &config.media_secret_key,
        &config.media_public_url,
    )
    .expect("Failed to initialize media storage");

    // Assemble the scan pipeline. Provider credentials are injected here;
    // stages never read process-wide state.
    let mut ingestor = ImageIngestor::new(Arc::new(storage));
    if let Some(max_width) = config.preprocess_max_width {
        tracing::info!(max_width, "Enabling capture-side resize hook");
        ingestor = ingestor.with_preprocess(preprocess::resize_max_width(max_width));
    }

    if config.replicate_api_token.is_none() {
        tracing::warn!("REPLICATE_API_TOKEN is not set; every scan will abort at the OCR stage");
    }
    let ocr = ReplicateOcr::new(OcrConfig::new(config.replicate_api_token.clone()));

    let llm: Option<Arc<dyn CompletionClient>> = match &config.openai_api_key {
        Some(key) => Some(Arc::new(OpenAiChat::new(key.clone(), config.llm_model.clone()))),
        None => {
            tracing::warn!("OPENAI_API_KEY is not set; cleanup and extraction will degrade");
            None
        }
    };

    let pipeline = ScanPipeline::new(
        ingestor,
        Arc::new(ocr),
        TextNormalizer::new(llm.clone()),
        NutritionExtractor::new(llm),
    );

    // Create shared application state
    let state = AppState::new(db_pool, pipeline);

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/scan", post(routes::scan::submit_scan))
        .route("/api/v1/scans", get(routes::scan::list_scans))
        .route("/api/v1/scans/{id}", get(routes::scan::get_scan))
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        // 5 MiB decoded is ~6.9 MiB of base64 plus the JSON envelope
        .layer(RequestBodyLimitLayer::new(8 * 1024 * 1024));

    tracing::info!("Starting nutriscan on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
