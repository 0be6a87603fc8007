//! Sync status routes

use axum::{extract::State, response::Json, routing::get, Router};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::models::SyncReport;

/// Outcome of the most recent runs, shared between the sync loop and the server.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    pub runs: u64,
    pub failures: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_report: Option<SyncReport>,
    pub last_error: Option<String>,
}

impl SyncStatus {
    pub fn record_success(&mut self, report: SyncReport) {
        self.runs += 1;
        self.last_run_at = Some(report.finished_at);
        self.last_report = Some(report);
        self.last_error = None;
    }

    pub fn record_failure(&mut self, error: impl ToString) {
        self.runs += 1;
        self.failures += 1;
        self.last_run_at = Some(Utc::now());
        self.last_error = Some(error.to_string());
    }
}

pub type SharedSyncStatus = Arc<RwLock<SyncStatus>>;

pub fn status_router(status: SharedSyncStatus) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/sync/status", get(get_sync_status))
        .layer(TraceLayer::new_for_http())
        .with_state(status)
}

async fn health_check() -> &'static str {
    "ok"
}

async fn get_sync_status(State(status): State<SharedSyncStatus>) -> Json<SyncStatus> {
    Json(status.read().clone())
}
