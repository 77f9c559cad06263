//! Daily state endpoints
//!
//! - `GET /api/days`: dates with persisted state, newest first
//! - `GET /api/days/today`: today's state in the reference zone
//! - `GET /api/days/:date`: state for `YYYY-MM-DD`

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use charday_common::time::{date_key, parse_date_key, today_in};
use charday_common::DailyState;
use serde::{Deserialize, Serialize};
use tracing::error;

use super::{ApiError, ApiResult, AppState};

#[derive(Debug, Serialize, Deserialize)]
pub struct DayListResponse {
    pub dates: Vec<String>,
}

/// GET /api/days
pub async fn list_days(State(state): State<AppState>) -> ApiResult<Json<DayListResponse>> {
    let dates = match state.store.list_dates().await {
        Ok(dates) => {
            state.clear_error().await;
            dates
        }
        Err(e) => return Err(store_failure(&state, e).await),
    };
    Ok(Json(DayListResponse {
        dates: dates.into_iter().map(date_key).collect(),
    }))
}

/// GET /api/days/today
pub async fn get_today(State(state): State<AppState>) -> ApiResult<Json<DailyState>> {
    let today = today_in(state.offset);
    load_day(&state, today).await
}

/// GET /api/days/:date
pub async fn get_day(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> ApiResult<Json<DailyState>> {
    let date = parse_date_key(&date).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    load_day(&state, date).await
}

async fn load_day(state: &AppState, date: NaiveDate) -> ApiResult<Json<DailyState>> {
    let day = match state.store.load(date).await {
        Ok(day) => {
            state.clear_error().await;
            day
        }
        Err(e) => return Err(store_failure(state, e).await),
    };
    day.map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no state for {}", date_key(date))))
}

async fn store_failure(state: &AppState, e: charday_common::Error) -> ApiError {
    error!(error = %e, "State store read failed");
    state.record_error(&e.to_string()).await;
    ApiError::Store(e)
}

pub fn day_routes() -> Router<AppState> {
    Router::new()
        .route("/api/days", get(list_days))
        .route("/api/days/today", get(get_today))
        .route("/api/days/:date", get(get_day))
}
