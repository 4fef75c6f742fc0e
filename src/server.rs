//! Server setup and application state wiring.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::database::Database;
use crate::events::MirrorSink;
use crate::logging::OpTimer;
use crate::memory::{DisabledEmbedder, DisabledExtractor, MemoryService};
use crate::portfolio::PortfolioService;
use crate::scheduler::IntentEngine;
use crate::{api, log_banner, log_init_step, log_success, AppState};

/// Create the application with all routes and state.
pub async fn create_app(config: AppConfig) -> anyhow::Result<Router> {
    let timer = OpTimer::new("server", "create_app");

    log_banner!(
        format!("Memoria API v{}", env!("CARGO_PKG_VERSION")),
        "Scheduled intents and memory retrieval"
    );

    let db_detail = config
        .database
        .path
        .clone()
        .unwrap_or_else(|| "in-memory".to_string());
    log_init_step!(1, 6, "Database", db_detail);
    let db = Database::from_config(&config.database).await?;

    log_init_step!(2, 6, "Mirror sink");
    let mirror = MirrorSink::spawn();

    log_init_step!(3, 6, "Intent engine");
    let engine = IntentEngine::new(db.clone(), mirror.clone());

    log_init_step!(4, 6, "Portfolio service");
    let portfolio = PortfolioService::new(db.clone());

    log_init_step!(5, 6, "Memory service", "extraction and embedding disabled");
    let memory = MemoryService::new(
        db.clone(),
        Arc::new(DisabledExtractor),
        Arc::new(DisabledEmbedder),
        portfolio.clone(),
        mirror,
    );

    log_init_step!(6, 6, "Router and middleware");
    let state = AppState {
        config: Arc::new(config.clone()),
        db,
        engine,
        memory,
        portfolio,
    };

    let app = api::create_router()
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.server.timeout_secs),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    log_success!("Memoria API server created successfully");
    timer.finish();

    Ok(app)
}
