//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{db::DbAdapter, SeedData},
    config::{Config, ConfigError, StorageBackend},
    error::ApiError,
    web::{self, rest::ApiDoc, spawn_expiry_watcher, state::AppState},
};
use attendance_core::memory::{
    InMemoryAttendanceStore, InMemoryDirectory, InMemorySessionRepository,
};
use attendance_core::{AttendanceEngine, Ports, SystemClock};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderName, HeaderValue, Method,
};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    let shutdown = CancellationToken::new();

    // --- 2. Wire the Storage Backend ---
    let ports = match &config.storage {
        StorageBackend::Postgres {
            database_url,
            max_connections,
        } => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(*max_connections)
                .connect(database_url)
                .await?;
            let db_adapter = Arc::new(DbAdapter::new(db_pool));
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            db_adapter.spawn_record_listener(shutdown.clone()).await?;

            Ports {
                clock: Arc::new(SystemClock),
                roster: db_adapter.clone(),
                courses: db_adapter.clone(),
                records: db_adapter.clone(),
                sessions: db_adapter,
            }
        }
        StorageBackend::Memory { seed_path } => {
            info!("Using in-memory storage; data is lost on restart");
            let directory = Arc::new(InMemoryDirectory::new());
            if let Some(path) = seed_path {
                SeedData::from_file(path)?.apply(&directory);
            }
            Ports {
                clock: Arc::new(SystemClock),
                roster: directory.clone(),
                courses: directory,
                records: Arc::new(InMemoryAttendanceStore::new()),
                sessions: Arc::new(InMemorySessionRepository::new()),
            }
        }
    };

    // --- 3. Build the Engine and the Shared AppState ---
    let engine = Arc::new(AttendanceEngine::new(ports, config.engine_config()?));
    let app_state = Arc::new(AppState {
        engine: engine.clone(),
    });
    let watcher = spawn_expiry_watcher(engine, config.expiry_poll_interval, shutdown.clone());

    // --- 4. Create the Web Router ---
    let origin = config
        .cors_allowed_origin
        .parse::<HeaderValue>()
        .map_err(|e| {
            ConfigError::InvalidValue("CORS_ALLOWED_ORIGIN".to_string(), e.to_string())
        })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static(web::middleware::USER_ID_HEADER),
        ]);

    let app = Router::new()
        .merge(web::router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    let _ = watcher.await;
    Ok(())
}
