pub mod api;
pub mod handlers;
pub mod state;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::server::state::AppState;

/// Routes of the slice-map HTTP interface
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/service", get(handlers::service_status))
        .route("/service/info", get(handlers::get_server_info))
        .route("/maps", post(handlers::create_map))
        .route("/queue/{map_id}", get(handlers::check_queue))
        .route("/maps/{map_id}/{subset_index}", get(handlers::get_tile))
        .with_state(state)
}

pub async fn run_server(config: Config) -> Result<()> {
    // Initialize tracing with environment-based filtering
    // Set RUST_LOG=debug for debug logs, RUST_LOG=info for info logs, etc.
    // Default to info level if no RUST_LOG is set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .init();

    let cache_dir = config.get_cache_directory();

    tracing::info!("🚀 Starting slice-map server");
    tracing::info!("🌐 Metadata service: {}", config.get_metadata_url());
    tracing::info!("🔧 Pipeline executable: {}", config.get_executable());
    tracing::info!("💾 Cache directory: {}", cache_dir);

    match config.get_job_timeout() {
        Some(timeout) => tracing::info!(
            "⏱️  Job timeout: {}",
            humantime::format_duration(timeout)
        ),
        None => tracing::info!("⏱️  Job timeout disabled"),
    }

    std::fs::create_dir_all(&cache_dir)?;

    let state = match AppState::new(&config) {
        Ok(state) => {
            tracing::info!("✅ Application state initialized successfully");
            Arc::new(state)
        }
        Err(e) => {
            tracing::error!("❌ Failed to initialize server: {}", e);
            return Err(e);
        }
    };

    if let Some(max_age) = config.get_cache_max_age() {
        tracing::info!(
            "🧹 Cache retention enabled: entries older than {} are removed every {}",
            humantime::format_duration(max_age),
            humantime::format_duration(config.get_sweep_interval())
        );
        let state_clone = Arc::clone(&state);
        let interval = config.get_sweep_interval();
        tokio::spawn(async move {
            background_sweep_task(state_clone, max_age, interval).await;
        });
    } else {
        tracing::info!("🧹 Cache retention disabled, entries are kept indefinitely");
    }

    let mut app = build_router(Arc::clone(&state)).layer(TraceLayer::new_for_http());
    if config.get_cors_enabled() {
        app = app.layer(ServiceBuilder::new().layer(CorsLayer::permissive()));
    }

    let host = config.get_host();
    let port = config.get_port();
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;

    tracing::info!("🌐 Server listening on http://{}:{}", host, port);
    tracing::info!(
        "🔧 Environment: RUST_LOG={}",
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
    );
    tracing::info!("🎯 Ready to serve requests!");

    let shutdown_state = Arc::clone(&state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("🛑 Shutdown requested, cancelling running jobs");
            shutdown_state.registry().cancel_all();
        })
        .await?;

    tracing::info!("🛑 Server shutdown");
    Ok(())
}

async fn background_sweep_task(state: Arc<AppState>, max_age: Duration, scan_interval: Duration) {
    use tokio::time::interval;

    let mut interval_timer = interval(scan_interval);

    loop {
        interval_timer.tick().await;

        tracing::debug!("🔍 Scanning cache for expired entries");

        let cache = state.service.cache().clone();
        let registry = Arc::clone(state.registry());

        match tokio::task::spawn_blocking(move || {
            cache.sweep_expired(max_age, |fp| registry.is_registered(fp))
        })
        .await
        {
            Ok(Ok(0)) => tracing::debug!("📭 No expired cache entries"),
            Ok(Ok(removed)) => tracing::info!("✅ Removed {} expired cache entries", removed),
            Ok(Err(e)) => tracing::warn!("⚠️ Cache sweep failed: {}", e),
            Err(e) => tracing::error!("❌ Cache sweep task aborted: {}", e),
        }
    }
}
