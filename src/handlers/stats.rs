use axum::extract::State;
use axum::Json;

use crate::models::{IngestStatusResponse, StatsResponse};
use crate::AppState;

/// `GET /api/v1/stats` — passive performance and memory counters.
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let snapshot = state.snapshots.current();
    let query_stats = state.query_stats.snapshot();
    Json(StatsResponse {
        hotels_ingested: snapshot.stats.hotels_ingested,
        offers_ingested: snapshot.stats.offers_ingested,
        rows_dropped: snapshot.stats.rows_dropped,
        distinct_hotels_indexed: snapshot.indexes.hotel_count(),
        memory_footprint_bytes: snapshot.columns.memory_footprint_bytes(),
        string_pool_size: snapshot.strings.len(),
        cache_entries: state.cache_best.len() + state.cache_detail.len(),
        last_build_duration_ms: snapshot.stats.build_duration.as_millis(),
        query_count: query_stats.query_count,
        cache_hit_rate: query_stats.cache_hit_rate,
        average_query_latency_micros: query_stats.average_latency_micros,
    })
}

/// `GET /api/v1/ingest/status` — the latest stage reported by the ingest
/// pipeline, whether that ingest is still running or finished long ago.
pub async fn ingest_status(State(state): State<AppState>) -> Json<IngestStatusResponse> {
    let progress = state.ingest_progress.lock();
    Json(IngestStatusResponse { stage: progress.stage.as_str(), percentage: progress.percentage, message: progress.message.clone() })
}
