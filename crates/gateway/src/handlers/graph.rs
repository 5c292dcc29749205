//! Graph traversal handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::handlers::validate_request;
use crate::AppState;
use graphrag_common::{errors::Result, Direction, Subgraph};
use graphrag_traversal::{AncestorChain, EdgeTypeTraversal, Neighbor, NeighborhoodStats, PathResult};

/// Expansion request
#[derive(Debug, Deserialize, Validate)]
pub struct ExpandRequest {
    #[validate(length(min = 1, max = 100, message = "Between 1 and 100 seed ids are required"))]
    pub seed_ids: Vec<String>,
    pub depth: Option<u32>,
    #[serde(default)]
    pub direction: Direction,
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_veracity: Option<f32>,
    pub max_nodes: Option<usize>,
}

/// Expand a subgraph around the seed nodes
pub async fn expand(
    State(state): State<AppState>,
    Json(request): Json<ExpandRequest>,
) -> Result<Json<Subgraph>> {
    validate_request(&request)?;

    let defaults = state.orchestrator.config();
    let subgraph = state
        .orchestrator
        .engine()
        .expand(
            &request.seed_ids,
            request.depth.unwrap_or(defaults.depth),
            request.direction,
            request.min_veracity.unwrap_or(defaults.min_veracity),
            request.max_nodes.unwrap_or(defaults.max_nodes),
        )
        .await?;

    Ok(Json(subgraph))
}

/// Edge-type restricted traversal request
#[derive(Debug, Deserialize, Validate)]
pub struct EdgeTypeRequest {
    #[validate(length(min = 1))]
    pub seed_id: String,
    #[validate(length(min = 1))]
    pub edge_type: String,
    pub depth: Option<u32>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_veracity: Option<f32>,
}

/// Follow only edges of one type from a seed node
pub async fn edge_type(
    State(state): State<AppState>,
    Json(request): Json<EdgeTypeRequest>,
) -> Result<Json<EdgeTypeTraversal>> {
    validate_request(&request)?;

    let defaults = state.orchestrator.config();
    let traversal = state
        .orchestrator
        .engine()
        .traverse_by_edge_type(
            &request.seed_id,
            &request.edge_type,
            request.depth.unwrap_or(defaults.depth),
            request.min_veracity.unwrap_or(defaults.min_veracity),
        )
        .await?;

    Ok(Json(traversal))
}

/// Shortest path request
#[derive(Debug, Deserialize, Validate)]
pub struct PathRequest {
    #[validate(length(min = 1))]
    pub source_id: String,
    #[validate(length(min = 1))]
    pub target_id: String,
    pub max_depth: Option<u32>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_veracity: Option<f32>,
}

/// Find the shortest path between two nodes
pub async fn path(
    State(state): State<AppState>,
    Json(request): Json<PathRequest>,
) -> Result<Json<PathResult>> {
    validate_request(&request)?;

    let engine = state.orchestrator.engine();
    let result = engine
        .find_path(
            &request.source_id,
            &request.target_id,
            request.max_depth.unwrap_or(engine.config().max_path_depth),
            request
                .min_veracity
                .unwrap_or(state.orchestrator.config().min_veracity),
        )
        .await?;

    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct AncestorsParams {
    pub max_depth: Option<u32>,
}

/// Resolve the derivation chain of a node
pub async fn ancestors(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    Query(params): Query<AncestorsParams>,
) -> Result<Json<AncestorChain>> {
    let engine = state.orchestrator.engine();
    let chain = engine
        .resolve_ancestors(
            &node_id,
            params.max_depth.unwrap_or(engine.config().max_ancestor_depth),
        )
        .await?;

    Ok(Json(chain))
}

#[derive(Debug, Deserialize, Validate)]
pub struct NeighborsParams {
    #[validate(range(min = 1))]
    pub limit: Option<usize>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_veracity: Option<f32>,
}

#[derive(Serialize)]
pub struct NeighborsResponse {
    pub node_id: String,
    pub neighbors: Vec<Neighbor>,
}

/// Neighbors returned when the request names no limit
pub const DEFAULT_NEIGHBOR_LIMIT: usize = 25;

/// Direct neighbors of a node, best scoring first
pub async fn neighbors(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    Query(params): Query<NeighborsParams>,
) -> Result<Json<NeighborsResponse>> {
    validate_request(&params)?;

    let neighbors = state
        .orchestrator
        .engine()
        .direct_neighbors(
            &node_id,
            params.limit.unwrap_or(DEFAULT_NEIGHBOR_LIMIT),
            params.min_veracity.unwrap_or(0.0),
        )
        .await?;

    Ok(Json(NeighborsResponse { node_id, neighbors }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct StatsParams {
    pub depth: Option<u32>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_veracity: Option<f32>,
}

/// Neighborhood statistics around a node
pub async fn stats(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    Query(params): Query<StatsParams>,
) -> Result<Json<NeighborhoodStats>> {
    validate_request(&params)?;

    let defaults = state.orchestrator.config();
    let stats = state
        .orchestrator
        .engine()
        .neighborhood_stats(
            &node_id,
            params.depth.unwrap_or(defaults.depth),
            params.min_veracity.unwrap_or(0.0),
        )
        .await?;

    Ok(Json(stats))
}
