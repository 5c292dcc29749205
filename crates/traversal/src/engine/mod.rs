//! Bounded graph traversal
//!
//! Every operation takes a minimum veracity threshold and checks its size
//! parameters against hard ceilings up front. A request above a ceiling fails
//! with `BoundsExceeded`; a result cut short by a node or row cap is flagged
//! `truncated`.

mod lineage;
mod neighbors;
mod path;

pub use lineage::AncestorChain;
pub use neighbors::{Neighbor, NeighborhoodStats};
pub use path::PathResult;

use crate::{
    HARD_MAX_ANCESTOR_DEPTH, HARD_MAX_EXPAND_DEPTH, HARD_MAX_PATH_DEPTH, HARD_MAX_RESULT_NODES,
};
use graphrag_common::config::TraversalConfig;
use graphrag_common::errors::{AppError, Result};
use graphrag_common::graph::clamp_unit;
use graphrag_common::metrics::record_traversal;
use graphrag_common::store::{TraversalQuery, TraversalRow};
use graphrag_common::{Direction, Edge, GraphStore, Path, Subgraph};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Result of an edge-type restricted traversal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeTypeTraversal {
    pub subgraph: Subgraph,
    /// Every discovered path, heaviest first
    pub paths: Vec<Path>,
}

/// Traversal engine over a `GraphStore`
pub struct GraphTraversalEngine {
    store: Arc<dyn GraphStore>,
    config: TraversalConfig,
}

impl GraphTraversalEngine {
    /// Configured limits are clamped to the hard ceilings
    pub fn new(store: Arc<dyn GraphStore>, mut config: TraversalConfig) -> Self {
        config.max_expand_depth = config.max_expand_depth.min(HARD_MAX_EXPAND_DEPTH);
        config.max_path_depth = config.max_path_depth.min(HARD_MAX_PATH_DEPTH);
        config.max_ancestor_depth = config.max_ancestor_depth.min(HARD_MAX_ANCESTOR_DEPTH);
        config.max_result_nodes = config.max_result_nodes.min(HARD_MAX_RESULT_NODES);
        config.max_rows = config.max_rows.max(1);
        Self { store, config }
    }

    pub fn config(&self) -> &TraversalConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Breadth-first expansion from `seed_ids`
    #[instrument(skip(self, seed_ids), fields(seeds = seed_ids.len(), %direction))]
    pub async fn expand(
        &self,
        seed_ids: &[String],
        depth: u32,
        direction: Direction,
        min_veracity: f32,
        max_nodes: usize,
    ) -> Result<Subgraph> {
        check_bound("depth", depth as usize, self.config.max_expand_depth as usize)?;
        check_bound("max_nodes", max_nodes, self.config.max_result_nodes)?;

        let (subgraph, _) = self
            .walk(seed_ids, depth, direction, min_veracity, max_nodes, None)
            .await?;
        record_traversal("expand", subgraph.nodes.len(), subgraph.truncated);
        Ok(subgraph)
    }

    /// Expansion restricted to `edge_type`, edges walked in both directions
    #[instrument(skip(self))]
    pub async fn traverse_by_edge_type(
        &self,
        seed_id: &str,
        edge_type: &str,
        depth: u32,
        min_veracity: f32,
    ) -> Result<EdgeTypeTraversal> {
        check_bound("depth", depth as usize, self.config.max_expand_depth as usize)?;
        if edge_type.trim().is_empty() {
            return Err(AppError::Validation {
                message: "Edge type must not be empty".to_string(),
                field: Some("edge_type".to_string()),
            });
        }

        let (subgraph, rows) = self
            .walk(
                &[seed_id.to_string()],
                depth,
                Direction::Both,
                min_veracity,
                self.config.max_result_nodes,
                Some(edge_type),
            )
            .await?;

        // Only paths whose every node made it into the subgraph
        let mut paths: Vec<Path> = rows
            .into_iter()
            .map(|row| row.path)
            .filter(|p| p.nodes.iter().all(|n| subgraph.contains_node(n)))
            .collect();
        paths.sort_by(|a, b| {
            b.weight
                .total_cmp(&a.weight)
                .then_with(|| a.len().cmp(&b.len()))
        });

        record_traversal("edge_type", subgraph.nodes.len(), subgraph.truncated);
        Ok(EdgeTypeTraversal { subgraph, paths })
    }

    /// Shared expansion core. Returns the subgraph and the raw rows it was built from.
    async fn walk(
        &self,
        seed_ids: &[String],
        depth: u32,
        direction: Direction,
        min_veracity: f32,
        max_nodes: usize,
        edge_type: Option<&str>,
    ) -> Result<(Subgraph, Vec<TraversalRow>)> {
        let min_veracity = clamp_unit(min_veracity);

        let mut seeds: Vec<String> = Vec::with_capacity(seed_ids.len());
        for id in seed_ids {
            if !seeds.contains(id) {
                seeds.push(id.clone());
            }
        }
        if seeds.is_empty() || max_nodes == 0 {
            return Ok((
                Subgraph {
                    anchor_ids: seeds,
                    truncated: max_nodes == 0,
                    ..Default::default()
                },
                Vec::new(),
            ));
        }

        let seed_nodes = self.store.get_nodes(&seeds).await?;
        if let Some(missing) = seeds
            .iter()
            .find(|id| !seed_nodes.iter().any(|n| &n.id == *id))
        {
            return Err(AppError::node_not_found(missing.clone()));
        }

        let rows = if depth == 0 {
            Vec::new()
        } else {
            self.store
                .bounded_traversal(&TraversalQuery {
                    seed_ids: seeds.clone(),
                    max_depth: depth,
                    min_veracity,
                    max_rows: self.config.max_rows,
                    direction,
                    edge_type: edge_type.map(str::to_string),
                })
                .await?
        };
        let mut truncated = rows.len() >= self.config.max_rows;

        // Minimum depth per node. Rows come shallowest first, so the first sighting wins.
        let mut order: Vec<String> = Vec::new();
        let mut distance: HashMap<String, u32> = HashMap::new();
        for id in &seeds {
            if order.len() >= max_nodes {
                truncated = true;
                break;
            }
            distance.insert(id.clone(), 0);
            order.push(id.clone());
        }

        let mut edges: Vec<Edge> = Vec::new();
        let mut edge_ids: HashSet<String> = HashSet::new();
        for row in &rows {
            if row.edge.score() < min_veracity || row.depth() > depth {
                continue;
            }
            let reached = row.reached();
            if !distance.contains_key(reached) {
                if order.len() >= max_nodes {
                    truncated = true;
                    continue;
                }
                distance.insert(reached.to_string(), row.depth());
                order.push(reached.to_string());
            }
            if edge_ids.insert(row.edge.id.clone()) {
                edges.push(row.edge.clone());
            }
        }

        // Hydrate the non-seed nodes; anything the store no longer has is dropped
        let mut by_id: HashMap<String, _> = seed_nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
        let rest: Vec<String> = order.iter().filter(|id| !by_id.contains_key(*id)).cloned().collect();
        if !rest.is_empty() {
            for node in self.store.get_nodes(&rest).await? {
                by_id.insert(node.id.clone(), node);
            }
        }

        let nodes: Vec<_> = order
            .iter()
            .filter_map(|id| {
                let node = by_id.get(id)?;
                Some(node.at_distance(distance.get(id).copied().unwrap_or_default()))
            })
            .collect();
        let present: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        edges.retain(|e| present.contains(e.source_id.as_str()) && present.contains(e.target_id.as_str()));

        debug!(
            nodes = nodes.len(),
            edges = edges.len(),
            rows = rows.len(),
            truncated,
            "Expansion complete"
        );

        Ok((
            Subgraph {
                nodes,
                edges,
                anchor_ids: seeds,
                query: None,
                truncated,
            },
            rows,
        ))
    }
}

/// Reject a request parameter above its ceiling
pub(crate) fn check_bound(parameter: &str, requested: usize, ceiling: usize) -> Result<()> {
    if requested > ceiling {
        return Err(AppError::BoundsExceeded {
            parameter: parameter.to_string(),
            requested,
            ceiling,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use graphrag_common::store::InMemoryGraph;

    fn engine(graph: InMemoryGraph) -> GraphTraversalEngine {
        GraphTraversalEngine::new(Arc::new(graph), TraversalConfig::default())
    }

    fn ids(subgraph: &Subgraph) -> Vec<&str> {
        subgraph.nodes.iter().map(|n| n.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_expand_filters_low_veracity_edges() {
        let engine = engine(fixtures::fan());
        let subgraph = engine
            .expand(&["A".to_string()], 1, Direction::Outgoing, 0.5, 100)
            .await
            .unwrap();

        assert_eq!(ids(&subgraph), vec!["A", "B"]);
        assert_eq!(subgraph.edges.len(), 1);
        assert_eq!(subgraph.edges[0].id, "A-B");
        assert!(subgraph.is_closed());
        assert!(!subgraph.truncated);
    }

    #[tokio::test]
    async fn test_expand_cycle_terminates_with_min_depth() {
        let engine = engine(fixtures::cycle());
        let subgraph = engine
            .expand(&["A".to_string()], 5, Direction::Both, 0.0, 100)
            .await
            .unwrap();

        assert_eq!(subgraph.nodes.len(), 4);
        let depth_of = |id: &str| subgraph.node(id).and_then(|n| n.distance);
        assert_eq!(depth_of("A"), Some(0));
        assert_eq!(depth_of("B"), Some(1));
        // C is one hop away over the C -> A edge
        assert_eq!(depth_of("C"), Some(1));
        assert_eq!(depth_of("D"), Some(2));
        assert!(subgraph.nodes.iter().all(|n| n.distance.unwrap() <= 5));
        assert!(subgraph.is_closed());
    }

    #[tokio::test]
    async fn test_expand_respects_direction() {
        let engine = engine(fixtures::chain());
        let incoming = engine
            .expand(&["B".to_string()], 2, Direction::Incoming, 0.0, 100)
            .await
            .unwrap();
        assert_eq!(ids(&incoming), vec!["B", "A"]);

        let outgoing = engine
            .expand(&["B".to_string()], 1, Direction::Outgoing, 0.0, 100)
            .await
            .unwrap();
        assert_eq!(ids(&outgoing), vec!["B", "C"]);
    }

    #[tokio::test]
    async fn test_expand_node_cap_flags_truncation() {
        let engine = engine(fixtures::chain());
        let subgraph = engine
            .expand(&["A".to_string()], 3, Direction::Outgoing, 0.0, 2)
            .await
            .unwrap();

        assert_eq!(ids(&subgraph), vec!["A", "B"]);
        assert!(subgraph.truncated);
        assert!(subgraph.is_closed());
    }

    #[tokio::test]
    async fn test_expand_depth_zero_returns_seeds() {
        let engine = engine(fixtures::chain());
        let subgraph = engine
            .expand(&["A".to_string()], 0, Direction::Both, 0.0, 10)
            .await
            .unwrap();
        assert_eq!(ids(&subgraph), vec!["A"]);
        assert!(subgraph.edges.is_empty());
    }

    #[tokio::test]
    async fn test_expand_bounds_exceeded() {
        let engine = engine(fixtures::chain());
        let err = engine
            .expand(&["A".to_string()], 6, Direction::Both, 0.0, 10)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::BoundsExceeded { requested: 6, ceiling: 5, .. }
        ));

        let err = engine
            .expand(&["A".to_string()], 1, Direction::Both, 0.0, 1001)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BoundsExceeded { .. }));
    }

    #[tokio::test]
    async fn test_expand_unknown_seed() {
        let engine = engine(fixtures::chain());
        let err = tokio_test::assert_err!(
            engine
                .expand(&["nope".to_string()], 1, Direction::Both, 0.0, 10)
                .await
        );
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_expand_no_seeds_is_empty() {
        let engine = engine(fixtures::chain());
        let subgraph = engine.expand(&[], 2, Direction::Both, 0.0, 10).await.unwrap();
        assert!(subgraph.is_empty());
    }

    #[tokio::test]
    async fn test_config_clamped_to_hard_ceilings() {
        let config = TraversalConfig {
            max_expand_depth: 50,
            max_result_nodes: 10_000,
            ..Default::default()
        };
        let engine = GraphTraversalEngine::new(Arc::new(fixtures::chain()), config);
        assert_eq!(engine.config().max_expand_depth, HARD_MAX_EXPAND_DEPTH);
        assert_eq!(engine.config().max_result_nodes, HARD_MAX_RESULT_NODES);
    }

    #[tokio::test]
    async fn test_edge_type_paths_sorted_by_weight() {
        let graph = InMemoryGraph::new()
            .with_node(graphrag_common::Node::new("S", "Claim", 1.0))
            .with_node(graphrag_common::Node::new("X", "Claim", 1.0))
            .with_node(graphrag_common::Node::new("Y", "Claim", 1.0))
            .with_node(graphrag_common::Node::new("Z", "Claim", 1.0))
            .with_edge(Edge::new("S-X", "CITES", "S", "X", 0.4))
            .with_edge(Edge::new("S-Y", "CITES", "S", "Y", 0.9))
            .with_edge(Edge::new("Y-Z", "CITES", "Y", "Z", 0.5))
            .with_edge(Edge::new("S-Z", "REFUTES", "S", "Z", 1.0));
        let engine = engine(graph);

        let result = engine
            .traverse_by_edge_type("S", "CITES", 2, 0.0)
            .await
            .unwrap();

        let weights: Vec<f32> = result.paths.iter().map(|p| p.weight).collect();
        assert_eq!(result.paths.len(), 3);
        assert!(weights.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(result.paths[0].nodes, vec!["S", "Y"]);
        assert!(result.subgraph.edges.iter().all(|e| e.edge_type == "CITES"));
        // Z reached only through Y, never over the REFUTES edge
        assert_eq!(result.subgraph.node("Z").and_then(|n| n.distance), Some(2));
    }

    #[tokio::test]
    async fn test_edge_type_floor_prunes_branch() {
        // S -0.9-> X -0.8-> Y stays, S -0.2-> W -0.9-> V falls below the floor
        let graph = InMemoryGraph::new()
            .with_node(graphrag_common::Node::new("S", "Claim", 1.0))
            .with_node(graphrag_common::Node::new("X", "Claim", 1.0))
            .with_node(graphrag_common::Node::new("Y", "Claim", 1.0))
            .with_node(graphrag_common::Node::new("W", "Claim", 1.0))
            .with_node(graphrag_common::Node::new("V", "Claim", 1.0))
            .with_edge(Edge::new("S-X", "CITES", "S", "X", 0.9))
            .with_edge(Edge::new("X-Y", "CITES", "X", "Y", 0.8))
            .with_edge(Edge::new("S-W", "CITES", "S", "W", 0.2))
            .with_edge(Edge::new("W-V", "CITES", "W", "V", 0.9));
        let engine = engine(graph);
        let floor = 0.5;

        let result = engine
            .traverse_by_edge_type("S", "CITES", 2, floor)
            .await
            .unwrap();

        let mut ids: Vec<&str> = result.subgraph.nodes.iter().map(|n| n.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["S", "X", "Y"]);
        assert!(result.subgraph.is_closed());
        assert!(result.subgraph.edges.iter().all(|e| e.score() >= floor));

        assert_eq!(result.paths.len(), 2);
        for path in &result.paths {
            assert!(path.weight >= floor * floor);
            for edge_id in &path.edges {
                let edge = result
                    .subgraph
                    .edges
                    .iter()
                    .find(|e| &e.id == edge_id)
                    .expect("path edge missing from subgraph");
                assert!(edge.score() >= floor);
            }
        }
        assert!(!result.paths.iter().any(|p| p.nodes.iter().any(|n| n == "W" || n == "V")));
    }
}
