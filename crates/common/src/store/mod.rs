//! Store client abstractions
//!
//! The graph and its embeddings live in an external store. This module defines the
//! two query interfaces the engine consumes:
//! - `VectorIndex`: nearest-neighbour search over node embeddings
//! - `GraphStore`: node lookup, one-hop edge lookup and bounded recursive traversal
//!
//! Implementations:
//! - `postgres`: sea-orm raw statements over `kg_nodes` / `kg_edges` with pgvector
//! - `memory`: in-process graph used by tests and local development

mod memory;
mod postgres;

pub use memory::InMemoryGraph;
pub use postgres::{PgGraphStore, PgVectorIndex};

use crate::errors::Result;
use crate::graph::{Direction, Edge, Node, Path};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Nearest-neighbour hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    pub node_id: String,
    /// Cosine similarity
    pub similarity: f32,
}

/// Nearest-neighbour search over node embeddings
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Hits with similarity >= `min_similarity`, most similar first, at most `limit`
    async fn nearest(
        &self,
        embedding: &[f32],
        min_similarity: f32,
        limit: usize,
        verified_only: bool,
    ) -> Result<Vec<VectorHit>>;
}

/// Parameters of a bounded recursive traversal
#[derive(Debug, Clone, PartialEq)]
pub struct TraversalQuery {
    pub seed_ids: Vec<String>,
    pub max_depth: u32,
    pub min_veracity: f32,
    /// Server-side row cap
    pub max_rows: usize,
    pub direction: Direction,
    /// Restrict to a single edge type
    pub edge_type: Option<String>,
}

/// One step of a traversal branch: the branch path from its seed and the edge
/// that produced the last hop
#[derive(Debug, Clone, PartialEq)]
pub struct TraversalRow {
    pub seed_id: String,
    pub edge: Edge,
    pub path: Path,
}

impl TraversalRow {
    /// Hop count of the reached node along this branch
    pub fn depth(&self) -> u32 {
        self.path.len() as u32
    }

    /// Node reached by this step
    pub fn reached(&self) -> &str {
        self.path.nodes.last().map(String::as_str).unwrap_or(&self.seed_id)
    }
}

/// Graph queries
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Nodes for the given ids. Unknown ids are omitted, order is not guaranteed.
    async fn get_nodes(&self, ids: &[String]) -> Result<Vec<Node>>;

    /// Edges walkable from any of `ids` in `direction` with veracity >= `min_veracity`
    async fn neighbors(
        &self,
        ids: &[String],
        direction: Direction,
        min_veracity: f32,
        edge_type: Option<&str>,
    ) -> Result<Vec<Edge>>;

    /// Cycle-safe bounded traversal. Each branch never revisits a node already on
    /// its own path. Rows come back shallowest first and never exceed `max_rows`.
    async fn bounded_traversal(&self, query: &TraversalQuery) -> Result<Vec<TraversalRow>>;

    /// The single `edge_type` backlink leaving `node_id`, if any
    async fn derived_from(&self, node_id: &str, edge_type: &str) -> Result<Option<Edge>>;
}

/// Cosine similarity; zero when either vector has no magnitude or dimensions differ
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
