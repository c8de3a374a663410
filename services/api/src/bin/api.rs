//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{FileLocalStore, GeminiClient, PgRemoteStore},
    config::Config,
    error::ApiError,
    web::{rest::ApiDoc, router, state::AppState},
};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::Router;
use neurostudy_core::{PersistenceGateway, StudyLibrary};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Open the Local Store & Optional Remote Table ---
    let local = Arc::new(FileLocalStore::open(&config.data_dir).await?);
    info!("Local store at {}", config.data_dir.display());

    let mut gateway = PersistenceGateway::new(local).with_policy(config.sync_policy);
    match &config.database_url {
        Some(url) => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
            let remote = PgRemoteStore::new(db_pool);
            info!("Running database migrations...");
            remote.run_migrations().await?;
            info!("Database migrations complete.");
            gateway = gateway.with_remote(Arc::new(remote));
        }
        None => info!("DATABASE_URL not set, running with local storage only."),
    }
    if gateway.has_remote() && !config.access_role.can_sync_remote() {
        warn!("A remote table is configured but ACCESS_ROLE is standard; remote sync is disabled.");
    }
    let gateway = Arc::new(gateway);

    // --- 3. Load the Library ---
    let data = gateway.load_data(config.access_role).await?;
    info!(
        "Loaded {} studies and {} folders.",
        data.studies.len(),
        data.folders.len()
    );

    // --- 4. Initialize the Generation Provider ---
    if config.gemini_api_key.is_none() {
        warn!("GEMINI_API_KEY is not set; generation endpoints will answer 503.");
    }
    let gemini = Arc::new(GeminiClient::new(
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
        config.gemini_base_url.clone(),
    ));

    // --- 5. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(
        StudyLibrary::from_data(data),
        gateway,
        gemini.clone(),
        gemini,
        config.clone(),
    ));

    // --- 6. Create the Web Router ---
    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
