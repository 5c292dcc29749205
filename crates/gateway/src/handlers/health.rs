//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub database: CheckResult,
    pub shared_cache: CheckResult,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    fn up(latency_ms: u64) -> Self {
        Self {
            status: "up".to_string(),
            latency_ms: Some(latency_ms),
            error: None,
        }
    }

    fn down(error: impl Into<String>) -> Self {
        Self {
            status: "down".to_string(),
            latency_ms: None,
            error: Some(error.into()),
        }
    }

    fn skipped() -> Self {
        Self {
            status: "skipped".to_string(),
            latency_ms: None,
            error: None,
        }
    }

    fn is_down(&self) -> bool {
        self.status == "down"
    }
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: graphrag_common::VERSION.to_string(),
    })
}

/// Readiness probe. Only the graph store gates readiness; the shared cache is
/// reported for visibility.
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let start = std::time::Instant::now();

    let database = match &state.db {
        Some(db) => match db.ping().await {
            Ok(_) => CheckResult::up(start.elapsed().as_millis() as u64),
            Err(e) => CheckResult::down(e.to_string()),
        },
        None => CheckResult::skipped(),
    };

    let start = std::time::Instant::now();
    let shared_cache = match state.orchestrator.cache().ping_shared().await {
        Some(true) => CheckResult::up(start.elapsed().as_millis() as u64),
        Some(false) => CheckResult::down("shared cache ping failed"),
        None => CheckResult::skipped(),
    };

    let ready = !database.is_down();

    Json(ReadyResponse {
        status: if ready { "ready" } else { "not_ready" }.to_string(),
        checks: HealthChecks {
            database,
            shared_cache,
        },
    })
}
