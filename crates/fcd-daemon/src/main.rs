//! fcd-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, builds the shared
//! state, wires middleware, and starts the HTTP server. All route handlers
//! live in `routes.rs`; all shared state types live in `state.rs`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use fcd_config::EngineConfig;
use fcd_daemon::{routes, state};
use fcd_scheduler::{CsvDirSeriesLoader, Scheduler};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file
    // does not exist — production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let config = load_config()?;
    info!(config_hash = %config.config_hash(), "engine config loaded");

    let series_dir =
        std::env::var("FCD_SERIES_DIR").unwrap_or_else(|_| "./series".to_string());
    let loader = Arc::new(CsvDirSeriesLoader::new(series_dir.clone()));
    info!(%series_dir, "series loader ready");

    let scheduler = Scheduler::new(loader, config.clone());
    let shared = Arc::new(state::AppState::new(scheduler, &config));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8910)));
    info!("fcd-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// Engine config: defaults, optionally overridden by the YAML file named
/// in FCD_CONFIG.
fn load_config() -> anyhow::Result<EngineConfig> {
    match std::env::var("FCD_CONFIG") {
        Ok(path) => EngineConfig::load_yaml_file(&path)
            .with_context(|| format!("loading config from {path}")),
        Err(_) => Ok(EngineConfig::default()),
    }
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("FCD_DAEMON_ADDR").ok()?.parse().ok()
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
