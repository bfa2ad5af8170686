#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web host for the reference layer intersection engine.
//!
//! Loads the layer catalog from a TOML map document at startup and serves
//! `ExtractIntersections` and `AreasAndLengths` over HTTP. Engine calls
//! run on the blocking thread pool, each bounded by the configured request
//! timeout.

mod handlers;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, HttpServer, middleware, web};
use thiserror::Error;
use wri_catalog::{CatalogError, DocumentMapService, LayerCatalog};
use wri_engine::{EngineConfig, EngineError, IntersectionEngine};
use wri_geometry::{DEFAULT_MEASURE_SRID, DEFAULT_SRID};

/// Default map document location.
pub const DEFAULT_MAP_DOCUMENT: &str = "data/reference.toml";

/// Default time limit for one engine call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors that can occur while starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The layer catalog could not be built.
    #[error("Failed to build layer catalog: {0}")]
    Catalog(#[from] CatalogError),

    /// The engine rejected its configuration.
    #[error("Failed to configure engine: {0}")]
    Engine(#[from] EngineError),

    /// Binding or running the HTTP server failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Server settings, read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind (`BIND_ADDR`).
    pub bind_addr: String,
    /// Port to bind (`PORT`).
    pub port: u16,
    /// Map document to build the catalog from (`WRI_MAP_DOCUMENT`).
    pub map_document: PathBuf,
    /// Spatial reference measures are reported in (`WRI_MEASURE_SRID`).
    pub measure_srid: u32,
    /// Time limit for one engine call (`WRI_REQUEST_TIMEOUT_SECS`).
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 8080,
            map_document: PathBuf::from(DEFAULT_MAP_DOCUMENT),
            measure_srid: DEFAULT_MEASURE_SRID,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Reads the configuration from environment variables, falling back to
    /// the defaults for unset or unparseable values.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            map_document: lookup("WRI_MAP_DOCUMENT").map_or(defaults.map_document, PathBuf::from),
            measure_srid: lookup("WRI_MEASURE_SRID")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.measure_srid),
            request_timeout: lookup("WRI_REQUEST_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .map_or(defaults.request_timeout, Duration::from_secs),
        }
    }
}

/// Shared application state.
pub struct AppState {
    /// Engine over the process-wide layer catalog.
    pub engine: IntersectionEngine,
    /// Time limit for one engine call.
    pub request_timeout: Duration,
}

/// Builds the catalog from the map document at `path` and wraps it in an
/// engine.
///
/// # Errors
///
/// Returns [`ServerError`] if the document or any of its layers cannot be
/// loaded, or the measurement system is unsupported.
pub fn build_engine(path: &Path, measure_srid: u32) -> Result<IntersectionEngine, ServerError> {
    let service = DocumentMapService::from_path(path)?;
    let catalog = LayerCatalog::build(&service)?;

    Ok(IntersectionEngine::new(
        Arc::new(catalog),
        EngineConfig {
            default_srid: DEFAULT_SRID,
            measure_srid,
        },
    )?)
}

/// Registers the service routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(handlers::root))
        .route("/layers", web::get().to(handlers::layers))
        .route(
            "/ExtractIntersections",
            web::post().to(handlers::extract_intersections),
        )
        .route(
            "/AreasAndLengths",
            web::post().to(handlers::areas_and_lengths),
        );
}

/// Starts the intersection server.
///
/// Builds the layer catalog from the configured map document and starts
/// the Actix-Web HTTP server. The caller is responsible for providing the
/// async runtime (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns [`ServerError`] if the catalog cannot be built, the server
/// fails to bind, or it encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> Result<(), ServerError> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = ServerConfig::from_env();

    log::info!("Loading map document {}...", config.map_document.display());
    let engine = build_engine(&config.map_document, config.measure_srid)?;

    log::info!(
        "Catalog '{}' ready with {} layers, measuring in {}",
        engine.catalog().map_name(),
        engine.catalog().len(),
        engine.measure_crs()
    );

    let state = web::Data::new(AppState {
        engine,
        request_timeout: config.request_timeout,
    });

    log::info!("Starting server on {}:{}", config.bind_addr, config.port);

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((config.bind_addr, config.port))?
    .run()
    .await?;

    Ok(())
}
