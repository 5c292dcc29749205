//! Cache invalidation handler
//!
//! Upstream writers call this after mutating nodes or edges so cached answers
//! derived from them are dropped from both tiers.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::handlers::validate_request;
use crate::AppState;
use graphrag_common::errors::Result;
use graphrag_context::InvalidationReport;

#[derive(Debug, Deserialize, Validate)]
pub struct InvalidateRequest {
    /// Changed node and edge ids
    #[validate(length(min = 1, max = 10000))]
    pub ids: Vec<String>,
}

#[derive(Serialize)]
pub struct InvalidateResponse {
    pub invalidated_ids: usize,
    #[serde(flatten)]
    pub report: InvalidationReport,
}

/// Drop every cached result that depends on any of the given ids
pub async fn invalidate(
    State(state): State<AppState>,
    Json(request): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>> {
    validate_request(&request)?;

    let report = state.orchestrator.cache().invalidate(&request.ids).await;
    info!(
        ids = request.ids.len(),
        local_removed = report.local_removed,
        shared_removed = report.shared_removed,
        "Cache invalidated"
    );

    Ok(Json(InvalidateResponse {
        invalidated_ids: request.ids.len(),
        report,
    }))
}
