use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use parking_lot::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use farecore::cache::ResultCache;
use farecore::config::Config;
use farecore::engine::{ingest, SnapshotManager};
use farecore::handlers::admin::map_ingest_error;
use farecore::{handlers, AppState, QueryStats};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("farecore=debug,tower_http=debug")))
        .init();

    let config_path = std::env::var("FARECORE_CONFIG").unwrap_or_else(|_| "./farecore.toml".to_string());
    let config = Arc::new(Config::load(&config_path)?);

    tracing::info!(
        hotels = %config.paths.hotels.display(),
        offers = %config.paths.offers.display(),
        "starting initial ingest"
    );

    let ingest_progress = Arc::new(Mutex::new(AppState::initial_progress()));

    let ingest_config = config.to_ingest_config();
    let hotels_path = config.paths.hotels.clone();
    let offers_path = config.paths.offers.clone();
    let progress_for_startup = ingest_progress.clone();
    let initial_snapshot = tokio::task::spawn_blocking(move || {
        let on_progress = move |progress| *progress_for_startup.lock() = progress;
        ingest(&hotels_path, &offers_path, &ingest_config, Some(&on_progress))
    })
    .await?
    .map_err(|e| anyhow::Error::new(map_ingest_error(e)))?;

    if initial_snapshot.stats.offers_ingested == 0 {
        tracing::warn!("startup ingest completed with zero offers; every search will return empty results");
    }
    tracing::info!(
        hotels = initial_snapshot.stats.hotels_ingested,
        offers = initial_snapshot.stats.offers_ingested,
        dropped = initial_snapshot.stats.rows_dropped,
        duration_ms = initial_snapshot.stats.build_duration.as_millis(),
        "initial snapshot ready"
    );

    let state = AppState {
        snapshots: Arc::new(SnapshotManager::new(initial_snapshot)),
        cache_best: Arc::new(ResultCache::new(Duration::from_millis(config.result_cache.ttl_ms), config.result_cache.max_entries)),
        cache_detail: Arc::new(ResultCache::new(Duration::from_millis(config.result_cache.ttl_ms), config.result_cache.max_entries)),
        config: config.clone(),
        ingest_progress,
        query_stats: Arc::new(QueryStats::default()),
    };

    spawn_cache_sweeper(state.clone());

    let app = Router::new()
        .route("/healthz", get(handlers::health::healthz))
        .route("/api/v1/search", get(handlers::search::search))
        .route("/api/v1/hotels/{hotelId}", get(handlers::search::hotel_detail))
        .route("/api/v1/stats", get(handlers::stats::stats))
        .route("/api/v1/ingest/status", get(handlers::stats::ingest_status))
        .route("/api/v1/admin/reload", post(handlers::admin::reload))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    tracing::info!("farecore-api listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically drops expired result-cache entries so a quiet cache doesn't
/// hold stale memory between queries for its full TTL window.
fn spawn_cache_sweeper(state: AppState) {
    let interval = Duration::from_millis(state.config.result_cache.sweep_ms);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let best_removed = state.cache_best.sweep_expired();
            let detail_removed = state.cache_detail.sweep_expired();
            if best_removed + detail_removed > 0 {
                tracing::debug!(best_removed, detail_removed, "swept expired cache entries");
            }
        }
    });
}
