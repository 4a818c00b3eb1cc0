use std::path::PathBuf;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::engine::{ingest, IngestConfig, IngestError, Snapshot};
use crate::error::AppError;
use crate::AppState;

/// `POST /api/v1/admin/reload` — re-ingests both source files from their
/// configured paths and atomically publishes the resulting snapshot. Runs on
/// a blocking thread since ingest is CPU-bound; the previous snapshot keeps
/// serving requests throughout.
///
/// If the run trips the configured `maxOffers`/`maxHotels` cap, the optional
/// result caches are surrendered and the ingest is retried once before
/// giving up — only a repeated or harder failure reaches the client as a 503.
pub async fn reload(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let hotels_path = state.config.paths.hotels.clone();
    let offers_path = state.config.paths.offers.clone();
    let ingest_config = state.config.to_ingest_config();

    let snapshot = match run_ingest_blocking(state.clone(), hotels_path.clone(), offers_path.clone(), ingest_config.clone()).await? {
        Ok(snapshot) => snapshot,
        Err(IngestError::OverCapacity { resource, limit, actual }) => {
            tracing::warn!(resource, limit, actual, "ingest over capacity, surrendering result caches and retrying once");
            state.cache_best.clear();
            state.cache_detail.clear();
            run_ingest_blocking(state.clone(), hotels_path, offers_path, ingest_config).await?.map_err(map_ingest_error)?
        }
        Err(other) => return Err(map_ingest_error(other)),
    };

    publish(&state, snapshot);
    Ok(Json(json!({ "status": "reloaded" })))
}

async fn run_ingest_blocking(
    state: AppState,
    hotels_path: PathBuf,
    offers_path: PathBuf,
    ingest_config: IngestConfig,
) -> Result<Result<Snapshot, IngestError>, AppError> {
    tokio::task::spawn_blocking(move || {
        let on_progress = move |progress| state.report_progress(progress);
        ingest(&hotels_path, &offers_path, &ingest_config, Some(&on_progress))
    })
    .await
    .map_err(|e| AppError::Internal(anyhow::anyhow!("reload task panicked: {e}")))
}

fn publish(state: &AppState, snapshot: Snapshot) {
    if snapshot.stats.offers_ingested == 0 {
        tracing::warn!("reload completed with zero offers ingested");
    }
    state.snapshots.swap(snapshot);
}

pub fn map_ingest_error(err: IngestError) -> AppError {
    match err {
        IngestError::SourceUnavailable { .. } => AppError::ServiceUnavailable(err.to_string()),
        IngestError::ZeroHotels => AppError::ServiceUnavailable(err.to_string()),
        IngestError::HardParseFailure { .. } => AppError::ServiceUnavailable(err.to_string()),
        IngestError::OverCapacity { .. } => AppError::OverCapacity(err.to_string()),
    }
}
