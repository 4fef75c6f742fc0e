//! Memoria API - Scheduled Intent Lifecycle Engine
//!
//! A single-binary HTTP service that stores user-defined scheduled intents
//! (cron, interval, one-time, and condition-watching triggers), computes when
//! each should next be checked, and records fire outcomes with optimistic
//! concurrency so racing pollers never double-record an execution. A
//! companion memory subsystem ingests chat transcripts and serves
//! similarity-ranked retrieval.
//!
//! # Architecture
//!
//! The service is organized into several key modules:
//!
//! - [`config`]: Configuration management and environment loading
//! - [`domain`]: Core domain models (intents, executions, memories)
//! - [`scheduler`]: Cron parsing, validation, next-check computation, and
//!   the fire-recording engine
//! - [`database`]: Repository traits with SQLite and in-memory backends
//! - [`memory`]: Transcript ingestion and retrieval
//! - [`portfolio`]: Portfolio holdings tracking
//! - [`events`]: Mirror event fan-out
//! - [`api`]: HTTP API endpoints
//!
//! # Example
//!
//! ```rust,ignore
//! use memoria_api::{config::AppConfig, server::create_app};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load()?;
//!     let app = create_app(config).await?;
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod api;
pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod events;
pub mod logging;
pub mod memory;
pub mod portfolio;
pub mod scheduler;
pub mod server;

use std::sync::Arc;

use config::AppConfig;
use database::Database;
use memory::MemoryService;
use portfolio::PortfolioService;
use scheduler::IntentEngine;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Storage backend.
    pub db: Database,
    /// Intent lifecycle engine.
    pub engine: IntentEngine,
    /// Memory ingestion and retrieval service.
    pub memory: MemoryService,
    /// Portfolio holdings service.
    pub portfolio: PortfolioService,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &"AppConfig")
            .field("db", &self.db)
            .field("engine", &"IntentEngine")
            .field("memory", &"MemoryService")
            .field("portfolio", &"PortfolioService")
            .finish()
    }
}
