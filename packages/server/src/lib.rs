#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the haze map application.
//!
//! Serves the REST API: nearby POI queries fused across the upstream
//! providers, exposure logging into the passport ledger, and the passport
//! and insights read endpoints. The web UI, authentication, and AI
//! assistant are external collaborators; this process only speaks JSON.

mod handlers;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use haze_map_aggregator::{Aggregator, AggregatorConfig};
use haze_map_cache::TtlCache;
use haze_map_passport::PassportLedger;
use haze_map_provider::registry;

/// TTL for cached queries that carry live pollutant readings.
const LIVE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// TTL for cached facility lookups; facility metadata churns far less
/// than pollutant readings.
const FACILITY_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// Timeout for one upstream HTTP request.
const UPSTREAM_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared application state.
pub struct AppState {
    /// Multi-provider query orchestrator.
    pub aggregator: Arc<Aggregator>,
    /// Durable passport ledger.
    pub ledger: Arc<PassportLedger>,
}

/// Starts the haze map API server.
///
/// Builds the provider registry and caches, opens the passport ledger, and
/// starts the Actix-Web HTTP server. This is a regular async function —
/// the caller is responsible for providing the async runtime (e.g. via
/// `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP server fails to bind or
/// encounters a runtime error.
///
/// # Panics
///
/// Panics if the HTTP client cannot be built or the ledger database cannot
/// be opened.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    log::info!("Building provider registry...");
    let client = reqwest::Client::builder()
        .timeout(UPSTREAM_HTTP_TIMEOUT)
        .build()
        .expect("Failed to build HTTP client");
    let providers = registry::build_providers(&client);

    let aggregator = Arc::new(Aggregator::new(
        providers,
        Arc::new(TtlCache::new(LIVE_CACHE_TTL)),
        Arc::new(TtlCache::new(FACILITY_CACHE_TTL)),
        AggregatorConfig::default(),
    ));

    log::info!("Opening passport ledger...");
    let db_path =
        std::env::var("HAZE_MAP_DB").unwrap_or_else(|_| "data/passport.db".to_string());
    let ledger = Arc::new(
        PassportLedger::open(Path::new(&db_path)).expect("Failed to open passport ledger"),
    );

    let state = web::Data::new(AppState { aggregator, ledger });

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .service(
                web::scope("/api")
                    .route("/health", web::get().to(handlers::health))
                    .route("/nearby", web::get().to(handlers::nearby))
                    .route("/exposure", web::post().to(handlers::log_exposure))
                    .route("/passport", web::get().to(handlers::passport))
                    .route("/insights", web::get().to(handlers::insights))
                    .route("/profile", web::post().to(handlers::ensure_profile)),
            )
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
