//! Retrieval handlers

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::handlers::validate_request;
use crate::AppState;
use graphrag_common::errors::{AppError, Result};
use graphrag_context::{QueryOverrides, QueryResponse};
use graphrag_traversal::Anchor;

/// Query request
#[derive(Debug, Deserialize, Validate)]
pub struct QueryRequest {
    #[validate(length(min = 1, max = 4000, message = "Query must be 1-4000 characters"))]
    pub query: String,

    /// Nodes always included in the context
    #[serde(default)]
    #[validate(length(max = 100))]
    pub pinned_node_ids: Vec<String>,

    #[serde(flatten)]
    pub overrides: QueryOverrides,
}

/// Answer a question from the graph
pub async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>> {
    validate_request(&request)?;

    let response = state
        .orchestrator
        .query(&request.query, &request.pinned_node_ids, &request.overrides)
        .await?;

    Ok(Json(response))
}

/// Anchor lookup request
#[derive(Debug, Deserialize, Validate)]
pub struct AnchorsRequest {
    #[validate(length(min = 1, max = 4000, message = "Query must be 1-4000 characters"))]
    pub query: String,

    #[validate(range(min = 1))]
    pub limit: Option<usize>,

    #[validate(range(min = 0.0, max = 1.0))]
    pub similarity_threshold: Option<f32>,

    pub verified_only: Option<bool>,
}

#[derive(Serialize)]
pub struct AnchorsResponse {
    pub query: String,
    pub anchors: Vec<Anchor>,
}

/// Locate anchor nodes without traversing or generating
pub async fn anchors(
    State(state): State<AppState>,
    Json(request): Json<AnchorsRequest>,
) -> Result<Json<AnchorsResponse>> {
    validate_request(&request)?;

    let defaults = state.orchestrator.config();
    let ceiling = state.orchestrator.engine().config().max_result_nodes;
    let limit = request.limit.unwrap_or(defaults.anchor_limit);
    if limit > ceiling {
        return Err(AppError::BoundsExceeded {
            parameter: "limit".to_string(),
            requested: limit,
            ceiling,
        });
    }

    let anchors = state
        .orchestrator
        .locator()
        .find_anchors(
            &request.query,
            limit,
            request
                .similarity_threshold
                .unwrap_or(defaults.similarity_threshold),
            request.verified_only.unwrap_or(defaults.verified_only),
        )
        .await?;

    Ok(Json(AnchorsResponse {
        query: request.query,
        anchors,
    }))
}
