mod app_state;
mod config;
mod db;
mod error;
mod models;
mod routes;
mod services;

use axum::extract::DefaultBodyLimit;
use axum::{routing::get, routing::patch, routing::post, routing::put, Router};
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
    cache::CacheClient,
    queue::{JobQueue, QueueConfig},
    storage::ObjectStorage,
    token::TokenService,
    vision::VisionClient,
};

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

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

    tracing::info!("Initializing bill-check server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_histogram!(
        "receipt_processing_seconds",
        "Time to process one receipt job end to end"
    );
    metrics::describe_counter!("receipt_jobs_total", "Total receipt jobs submitted");
    metrics::describe_counter!("receipt_jobs_completed", "Total receipt jobs completed");
    metrics::describe_counter!("receipt_jobs_failed", "Total receipt jobs that failed terminally");
    metrics::describe_gauge!(
        "receipt_queue_depth",
        "Current number of waiting jobs in the queue"
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

    // Initialize object storage client
    tracing::info!("Initializing object storage client");
    let storage = ObjectStorage::new(
        &config.storage_bucket,
        &config.storage_endpoint,
        &config.storage_access_key,
        &config.storage_secret_key,
        &config.storage_public_url,
    )
    .expect("Failed to initialize object storage client");

    // Initialize Redis job queue and cache
    tracing::info!("Connecting to Redis");
    let queue = JobQueue::new(&config.redis_url, QueueConfig::from_app_config(&config))
        .expect("Failed to initialize job queue");
    let cache = CacheClient::new(&config.redis_url).expect("Failed to initialize cache client");

    // Initialize vision collaborator client
    tracing::info!("Initializing vision analysis client");
    let vision = VisionClient::new(&config.gemini_api_key, &config.gemini_model);

    // Token signing service
    let tokens = TokenService::new(
        &config.jwt_secret,
        config.jwt_access_ttl_secs,
        config.jwt_refresh_ttl_secs,
    );

    // Create shared application state
    let state = AppState::new(db_pool, storage, queue, vision, cache, tokens);

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        // Auth
        .route("/api/v1/auth/register", post(routes::auth::register))
        .route("/api/v1/auth/login", post(routes::auth::login))
        .route("/api/v1/auth/refresh-token", post(routes::auth::refresh_token))
        .route("/api/v1/auth/forgot-password", post(routes::auth::forgot_password))
        .route("/api/v1/auth/reset-password", post(routes::auth::reset_password))
        .route("/api/v1/auth/logout", post(routes::auth::logout))
        .route("/api/v1/auth/me", get(routes::auth::me))
        .route("/api/v1/auth/profile", put(routes::auth::update_profile))
        .route("/api/v1/auth/change-password", put(routes::auth::change_password))
        .route("/api/v1/auth/usage-stats", get(routes::auth::usage_stats))
        // Receipt pipeline
        .route("/api/v1/image/upload", post(routes::receipts::upload_receipt))
        .route("/api/v1/image", get(routes::receipts::list_receipts))
        .route("/api/v1/image/jobs", get(routes::receipts::get_user_jobs))
        .route("/api/v1/image/jobs/{job_id}/status", get(routes::receipts::get_job_status))
        .route(
            "/api/v1/image/{id}",
            get(routes::receipts::get_receipt).delete(routes::receipts::delete_receipt),
        )
        .route("/api/v1/image/{id}/feedback", post(routes::receipts::provide_feedback))
        .route("/api/v1/image/{id}/archive", patch(routes::receipts::archive_receipt))
        // Dashboards
        .route("/api/v1/dashboard/user", get(routes::dashboard::user_dashboard))
        .route("/api/v1/dashboard/admin", get(routes::dashboard::admin_dashboard))
        .route("/api/v1/dashboard/health", get(routes::dashboard::system_health))
        .route("/api/v1/dashboard/analytics", get(routes::dashboard::processing_analytics))
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES));

    tracing::info!("Starting bill-check on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
