//! Read-only status API
//!
//! Exposes the persisted daily state as JSON. Nothing here mutates state;
//! publishing is driven by the CLI only.

pub mod days;
pub mod error;
pub mod health;

use axum::Router;
use chrono::{DateTime, FixedOffset, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::lifecycle::StateStore;

pub use days::day_routes;
pub use error::{ApiError, ApiResult};
pub use health::health_routes;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StateStore>,
    /// Reference zone used to resolve "today"
    pub offset: FixedOffset,
    pub startup_time: DateTime<Utc>,
    /// Last store error seen by a handler, reported by `/health`
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(store: Arc<dyn StateStore>, offset: FixedOffset) -> Self {
        Self {
            store,
            offset,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub(crate) async fn record_error(&self, message: &str) {
        *self.last_error.write().await = Some(message.to_string());
    }

    /// Forget the last store error after a read succeeds
    pub(crate) async fn clear_error(&self) {
        let mut last_error = self.last_error.write().await;
        if let Some(previous) = last_error.take() {
            info!(previous = %previous, "State store readable again");
        }
    }
}

/// Complete router with state attached
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(day_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
