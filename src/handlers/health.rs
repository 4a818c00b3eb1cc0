use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::AppState;

pub async fn healthz(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.snapshots.current();
    Json(json!({
        "status": "ok",
        "offersIndexed": snapshot.columns.len(),
        "hotelsIndexed": snapshot.hotels.known_len(),
    }))
}
