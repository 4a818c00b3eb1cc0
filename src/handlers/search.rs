use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::cache::Fingerprint;
use crate::engine::{HotelNotFound, QueryPlanner};
use crate::error::AppError;
use crate::models::{render_best_per_hotel, render_hotel_detail, SearchParams};
use crate::AppState;

/// `GET /api/v1/search` — the `best_per_hotel` aggregate.
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, AppError> {
    let query = params.into_query()?;
    let fingerprint = Fingerprint::new(&query, "best");

    if let Some(cached) = state.cache_best.get(&fingerprint) {
        state.query_stats.record_hit();
        return Ok(Json(cached));
    }

    let started = Instant::now();
    let snapshot = state.snapshots.current();
    let limits = state.config.query_limits();
    let outcome = QueryPlanner::find_best_per_hotel(&snapshot, &query, &limits);

    if outcome.partial && outcome.rows.is_empty() {
        return Err(AppError::Timeout);
    }

    let entries = render_best_per_hotel(&snapshot, &query, &outcome.rows);
    state.cache_best.insert(fingerprint, entries.clone());
    state.query_stats.record_miss(started.elapsed());
    Ok(Json(entries))
}

/// `GET /api/v1/hotels/{hotelId}` — the `hotel_detail` listing.
pub async fn hotel_detail(
    State(state): State<AppState>,
    Path(hotel_id): Path<u32>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, AppError> {
    let query = params.into_query()?;
    let fingerprint = Fingerprint::new(&query, &format!("detail:{hotel_id}"));

    if let Some(cached) = state.cache_detail.get(&fingerprint) {
        state.query_stats.record_hit();
        return Ok(Json(cached));
    }

    let started = Instant::now();
    let snapshot = state.snapshots.current();
    let limits = state.config.query_limits();
    let outcome = QueryPlanner::find_hotel_detail(&snapshot, hotel_id, &query, &limits)
        .map_err(|HotelNotFound| AppError::HotelNotFound(hotel_id))?;

    if outcome.partial && outcome.rows.is_empty() {
        return Err(AppError::Timeout);
    }

    let response = render_hotel_detail(&snapshot, &outcome);
    state.cache_detail.insert(fingerprint, response.clone());
    state.query_stats.record_miss(started.elapsed());
    Ok(Json(response))
}
