pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod models;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use cache::ResultCache;
use config::Config;
use engine::{IngestProgress, IngestStage, SnapshotManager};
use models::{BestPerHotelEntry, HotelDetailResponse};

/// Shared application state handed to every handler through axum's `State`
/// extractor. Cheap to clone — every field is an `Arc` (or, for `Config`,
/// effectively read-only after startup).
#[derive(Clone)]
pub struct AppState {
    pub snapshots: Arc<SnapshotManager>,
    pub cache_best: Arc<ResultCache<Vec<BestPerHotelEntry>>>,
    pub cache_detail: Arc<ResultCache<HotelDetailResponse>>,
    pub config: Arc<Config>,
    pub ingest_progress: Arc<Mutex<IngestProgress>>,
    pub query_stats: Arc<QueryStats>,
}

impl AppState {
    pub fn report_progress(&self, progress: IngestProgress) {
        *self.ingest_progress.lock() = progress;
    }

    pub fn initial_progress() -> IngestProgress {
        IngestProgress { stage: IngestStage::ParsingHotels, percentage: 0, message: "starting up".into() }
    }
}

/// Passive counters behind `/api/v1/stats`' `performance_stats` fields —
/// query volume, cache hit rate, average latency. Never read back into any
/// decision the planner or cache makes; this is observability, not a
/// self-tuning knob.
#[derive(Debug, Default)]
pub struct QueryStats {
    query_count: AtomicU64,
    cache_hits: AtomicU64,
    total_latency_micros: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub struct QueryStatsSnapshot {
    pub query_count: u64,
    pub cache_hit_rate: f64,
    pub average_latency_micros: u64,
}

impl QueryStats {
    /// Records a cache hit. Hits still count toward `query_count` but
    /// contribute no latency sample since no planning work ran.
    pub fn record_hit(&self) {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a cache miss that required planning, with the wall-clock time
    /// spent planning and rendering the response.
    pub fn record_miss(&self, latency: Duration) {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_micros.fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> QueryStatsSnapshot {
        let query_count = self.query_count.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let total_latency_micros = self.total_latency_micros.load(Ordering::Relaxed);
        let misses = query_count - cache_hits;
        QueryStatsSnapshot {
            query_count,
            cache_hit_rate: if query_count == 0 { 0.0 } else { cache_hits as f64 / query_count as f64 },
            average_latency_micros: if misses == 0 { 0 } else { total_latency_micros / misses },
        }
    }
}
