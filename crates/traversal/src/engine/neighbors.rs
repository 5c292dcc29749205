//! One-hop neighbors and neighborhood statistics

use super::{check_bound, GraphTraversalEngine};
use graphrag_common::errors::{AppError, Result};
use graphrag_common::graph::clamp_unit;
use graphrag_common::{Direction, Edge, Node};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::instrument;

/// Neighbor scored by `node_veracity * edge_veracity`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub node: Node,
    pub edge: Edge,
    pub score: f32,
}

/// Shape of the bounded neighborhood around a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborhoodStats {
    pub node_id: String,
    pub depth: u32,
    pub node_count: usize,
    pub edge_count: usize,
    /// Distance -> number of nodes first reached at that distance
    pub nodes_per_depth: BTreeMap<u32, usize>,
    /// Edge type -> count
    pub edge_types: BTreeMap<String, usize>,
    pub mean_node_veracity: f32,
    pub mean_edge_veracity: f32,
    pub truncated: bool,
}

fn mean(values: impl Iterator<Item = f32>) -> f32 {
    let (sum, count) = values.fold((0.0f32, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

impl GraphTraversalEngine {
    #[instrument(skip(self))]
    pub async fn direct_neighbors(
        &self,
        node_id: &str,
        limit: usize,
        min_veracity: f32,
    ) -> Result<Vec<Neighbor>> {
        check_bound("limit", limit, self.config.max_result_nodes)?;
        let min_veracity = clamp_unit(min_veracity);

        let ids = [node_id.to_string()];
        if self.store.get_nodes(&ids).await?.is_empty() {
            return Err(AppError::node_not_found(node_id));
        }

        let edges = self
            .store
            .neighbors(&ids, Direction::Both, min_veracity, None)
            .await?;

        let other_ids: Vec<String> = edges
            .iter()
            .filter_map(|e| e.other_end(node_id))
            .filter(|id| *id != node_id)
            .map(str::to_string)
            .collect();
        let nodes: HashMap<String, Node> = self
            .store
            .get_nodes(&other_ids)
            .await?
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect();

        // Best-scoring edge per neighbor
        let mut best: HashMap<&str, Neighbor> = HashMap::new();
        for edge in &edges {
            let Some(other) = edge.other_end(node_id).filter(|id| *id != node_id) else {
                continue;
            };
            let Some(node) = nodes.get(other) else {
                continue;
            };
            let score = clamp_unit(node.score() * edge.score());
            let replace = best.get(other).map_or(true, |current| score > current.score);
            if replace {
                best.insert(
                    other,
                    Neighbor {
                        node: Node {
                            embedding: None,
                            ..node.clone()
                        },
                        edge: edge.clone(),
                        score,
                    },
                );
            }
        }

        let mut neighbors: Vec<Neighbor> = best.into_values().collect();
        neighbors.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.node.id.cmp(&b.node.id))
        });
        neighbors.truncate(limit);
        Ok(neighbors)
    }

    #[instrument(skip(self))]
    pub async fn neighborhood_stats(
        &self,
        node_id: &str,
        depth: u32,
        min_veracity: f32,
    ) -> Result<NeighborhoodStats> {
        let subgraph = self
            .expand(
                &[node_id.to_string()],
                depth,
                Direction::Both,
                min_veracity,
                self.config.max_result_nodes,
            )
            .await?;

        let mut nodes_per_depth = BTreeMap::new();
        for node in &subgraph.nodes {
            *nodes_per_depth.entry(node.distance.unwrap_or_default()).or_insert(0) += 1;
        }
        let mut edge_types = BTreeMap::new();
        for edge in &subgraph.edges {
            *edge_types.entry(edge.edge_type.clone()).or_insert(0) += 1;
        }

        Ok(NeighborhoodStats {
            node_id: node_id.to_string(),
            depth,
            node_count: subgraph.nodes.len(),
            edge_count: subgraph.edges.len(),
            nodes_per_depth,
            edge_types,
            mean_node_veracity: mean(subgraph.nodes.iter().map(Node::score)),
            mean_edge_veracity: mean(subgraph.edges.iter().map(Edge::score)),
            truncated: subgraph.truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use graphrag_common::config::TraversalConfig;
    use graphrag_common::store::InMemoryGraph;
    use std::sync::Arc;

    fn engine(graph: InMemoryGraph) -> GraphTraversalEngine {
        GraphTraversalEngine::new(Arc::new(graph), TraversalConfig::default())
    }

    fn star() -> InMemoryGraph {
        // Scores: P = 1.0 * 0.5, Q = 0.9 * 1.0, R = 0.4 * 0.5
        InMemoryGraph::new()
            .with_node(Node::new("hub", "Claim", 1.0))
            .with_node(Node::new("P", "Claim", 1.0))
            .with_node(Node::new("Q", "Claim", 0.9))
            .with_node(Node::new("R", "Claim", 0.4))
            .with_edge(Edge::new("hub-P", "SUPPORTS", "hub", "P", 0.5))
            .with_edge(Edge::new("Q-hub", "SUPPORTS", "Q", "hub", 1.0))
            .with_edge(Edge::new("hub-R", "REFUTES", "hub", "R", 0.5))
    }

    #[tokio::test]
    async fn test_direct_neighbors_sorted_by_score() {
        let engine = engine(star());
        let neighbors = engine.direct_neighbors("hub", 10, 0.0).await.unwrap();

        let scores: Vec<f32> = neighbors.iter().map(|n| n.score).collect();
        let ids: Vec<&str> = neighbors.iter().map(|n| n.node.id.as_str()).collect();
        assert_eq!(ids, vec!["Q", "P", "R"]);
        for (actual, expected) in scores.iter().zip([0.9f32, 0.5, 0.2]) {
            assert!((actual - expected).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn test_direct_neighbors_limit_and_threshold() {
        let engine = engine(star());
        let top = engine.direct_neighbors("hub", 1, 0.0).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].node.id, "Q");

        let strong = engine.direct_neighbors("hub", 10, 0.6).await.unwrap();
        assert_eq!(strong.len(), 1);
        assert!(strong.iter().all(|n| n.edge.score() >= 0.6));
    }

    #[tokio::test]
    async fn test_direct_neighbors_errors() {
        let engine = engine(star());
        assert!(matches!(
            engine.direct_neighbors("ghost", 5, 0.0).await,
            Err(AppError::NotFound { .. })
        ));
        assert!(matches!(
            engine.direct_neighbors("hub", 5000, 0.0).await,
            Err(AppError::BoundsExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_neighborhood_stats() {
        let engine = engine(fixtures::chain());
        let stats = engine.neighborhood_stats("B", 1, 0.0).await.unwrap();

        assert_eq!(stats.node_count, 3);
        assert_eq!(stats.edge_count, 2);
        assert_eq!(stats.nodes_per_depth.get(&0), Some(&1));
        assert_eq!(stats.nodes_per_depth.get(&1), Some(&2));
        assert_eq!(stats.edge_types.get("LINK"), Some(&2));
        assert!((stats.mean_edge_veracity - 1.0).abs() < 1e-6);
        assert!(!stats.truncated);
    }
}
