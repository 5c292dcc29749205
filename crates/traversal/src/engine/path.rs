//! Shortest path by bidirectional breadth-first search
//!
//! Edges are treated as undirected, so a path from A to B exists exactly when one
//! from B to A does. The two searches alternate one hop at a time and stop once
//! their visited sets meet or the combined hop count reaches `max_depth`.

use super::{check_bound, GraphTraversalEngine};
use graphrag_common::errors::{AppError, Result};
use graphrag_common::graph::clamp_unit;
use graphrag_common::metrics::record_traversal;
use graphrag_common::{Direction, Edge};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Shortest path lookup result. `found == false` is a normal outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathResult {
    pub found: bool,
    /// Number of hops
    pub length: usize,
    /// Product of edge weights; 0 when not found
    pub weight: f32,
    pub nodes: Vec<String>,
    pub edges: Vec<Edge>,
}

impl PathResult {
    fn not_found() -> Self {
        Self {
            found: false,
            length: 0,
            weight: 0.0,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }
}

/// One side of the search: node -> (hop count, edge back towards the origin)
struct Side {
    visited: HashMap<String, (u32, Option<Edge>)>,
    frontier: Vec<String>,
    depth: u32,
}

impl Side {
    fn new(origin: &str) -> Self {
        let mut visited = HashMap::new();
        visited.insert(origin.to_string(), (0, None));
        Self {
            visited,
            frontier: vec![origin.to_string()],
            depth: 0,
        }
    }

    /// Edges from `node_id` back to this side's origin, nearest first
    fn trail(&self, node_id: &str) -> Vec<(String, Edge)> {
        let mut trail = Vec::new();
        let mut current = node_id.to_string();
        while let Some((_, Some(edge))) = self.visited.get(&current) {
            let Some(next) = edge.other_end(&current) else {
                break;
            };
            let next = next.to_string();
            trail.push((next.clone(), edge.clone()));
            current = next;
        }
        trail
    }
}

impl GraphTraversalEngine {
    #[instrument(skip(self))]
    pub async fn find_path(
        &self,
        source_id: &str,
        target_id: &str,
        max_depth: u32,
        min_veracity: f32,
    ) -> Result<PathResult> {
        check_bound("max_depth", max_depth as usize, self.config.max_path_depth as usize)?;
        let min_veracity = clamp_unit(min_veracity);

        let ids = vec![source_id.to_string(), target_id.to_string()];
        let found = self.store.get_nodes(&ids).await?;
        for id in &ids {
            if !found.iter().any(|n| &n.id == id) {
                return Err(AppError::node_not_found(id.clone()));
            }
        }

        if source_id == target_id {
            return Ok(PathResult {
                found: true,
                length: 0,
                weight: 1.0,
                nodes: vec![source_id.to_string()],
                edges: Vec::new(),
            });
        }

        let mut forward = Side::new(source_id);
        let mut backward = Side::new(target_id);
        let mut expand_forward = true;

        while forward.depth + backward.depth < max_depth {
            if forward.frontier.is_empty() || backward.frontier.is_empty() {
                break;
            }

            let (side, other) = if expand_forward {
                (&mut forward, &backward)
            } else {
                (&mut backward, &forward)
            };

            let edges = self
                .store
                .neighbors(&side.frontier, Direction::Both, min_veracity, None)
                .await?;
            side.depth += 1;

            let mut next = Vec::new();
            let mut meetings = Vec::new();
            for edge in edges {
                for from in [&edge.source_id, &edge.target_id] {
                    if !side.frontier.contains(from) {
                        continue;
                    }
                    let Some(to) = edge.other_end(from) else {
                        continue;
                    };
                    if side.visited.contains_key(to) {
                        continue;
                    }
                    side.visited
                        .insert(to.to_string(), (side.depth, Some(edge.clone())));
                    next.push(to.to_string());
                    if let Some((other_depth, _)) = other.visited.get(to) {
                        meetings.push((side.depth + other_depth, to.to_string()));
                    }
                }
            }
            side.frontier = next;

            debug!(
                forward = expand_forward,
                depth = side.depth,
                frontier = side.frontier.len(),
                "Path search hop"
            );

            if !meetings.is_empty() {
                let shortest = meetings.iter().map(|(len, _)| *len).min().unwrap_or_default();
                let best = meetings
                    .into_iter()
                    .filter(|(len, _)| *len == shortest)
                    .map(|(_, meet)| stitch(&forward, &backward, &meet, source_id))
                    .max_by(|a, b| {
                        a.weight
                            .total_cmp(&b.weight)
                            .then_with(|| b.nodes.cmp(&a.nodes))
                    });
                if let Some(path) = best {
                    record_traversal("path", path.nodes.len(), false);
                    return Ok(path);
                }
            }

            expand_forward = !expand_forward;
        }

        record_traversal("path", 0, false);
        Ok(PathResult::not_found())
    }
}

/// Join the two half-paths at `meet`
fn stitch(forward: &Side, backward: &Side, meet: &str, source_id: &str) -> PathResult {
    let mut nodes = vec![source_id.to_string()];
    let mut edges = Vec::new();

    // forward.trail walks meet -> source; reverse it to read source -> meet
    let head = forward.trail(meet);
    for (i, (_, edge)) in head.iter().enumerate().rev() {
        edges.push(edge.clone());
        let step = if i == 0 { meet.to_string() } else { head[i - 1].0.clone() };
        nodes.push(step);
    }
    for (node, edge) in backward.trail(meet) {
        edges.push(edge);
        nodes.push(node);
    }

    let weight = edges
        .iter()
        .fold(1.0f32, |acc, e| clamp_unit(acc * e.score()));
    PathResult {
        found: true,
        length: edges.len(),
        weight,
        nodes,
        edges,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use graphrag_common::config::TraversalConfig;
    use graphrag_common::store::InMemoryGraph;
    use graphrag_common::Node;
    use std::sync::Arc;

    fn engine(graph: InMemoryGraph) -> GraphTraversalEngine {
        GraphTraversalEngine::new(Arc::new(graph), TraversalConfig::default())
    }

    #[tokio::test]
    async fn test_find_path_chain() {
        let engine = engine(fixtures::chain());
        let path = engine.find_path("A", "D", 4, 0.0).await.unwrap();

        assert!(path.found);
        assert_eq!(path.length, 3);
        assert!((path.weight - 1.0).abs() < f32::EPSILON);
        assert_eq!(path.nodes, vec!["A", "B", "C", "D"]);
        let edge_ids: Vec<&str> = path.edges.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(edge_ids, vec!["A-B", "B-C", "C-D"]);
    }

    #[tokio::test]
    async fn test_find_path_symmetric() {
        let engine = engine(fixtures::chain());
        for limit in 0..=4 {
            let forward = engine.find_path("A", "D", limit, 0.0).await.unwrap();
            let backward = engine.find_path("D", "A", limit, 0.0).await.unwrap();
            assert_eq!(forward.found, backward.found, "limit {}", limit);
        }

        let back = engine.find_path("D", "A", 3, 0.0).await.unwrap();
        assert_eq!(back.nodes, vec!["D", "C", "B", "A"]);
    }

    #[tokio::test]
    async fn test_find_path_depth_limit() {
        let engine = engine(fixtures::chain());
        let path = engine.find_path("A", "D", 2, 0.0).await.unwrap();
        assert!(!path.found);
        assert_eq!(path.weight, 0.0);
    }

    #[tokio::test]
    async fn test_find_path_respects_veracity() {
        let engine = engine(fixtures::fan());
        let path = engine.find_path("B", "C", 4, 0.5).await.unwrap();
        assert!(!path.found);

        let path = engine.find_path("B", "C", 4, 0.0).await.unwrap();
        assert!(path.found);
        assert!((path.weight - 0.24).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_find_path_prefers_heavier_of_equal_length() {
        let graph = InMemoryGraph::new()
            .with_node(Node::new("S", "T", 1.0))
            .with_node(Node::new("L", "T", 1.0))
            .with_node(Node::new("H", "T", 1.0))
            .with_node(Node::new("T", "T", 1.0))
            .with_edge(Edge::new("S-L", "X", "S", "L", 0.2))
            .with_edge(Edge::new("L-T", "X", "L", "T", 0.2))
            .with_edge(Edge::new("S-H", "X", "S", "H", 0.9))
            .with_edge(Edge::new("H-T", "X", "H", "T", 0.9));
        let engine = engine(graph);

        let path = engine.find_path("S", "T", 4, 0.0).await.unwrap();
        assert_eq!(path.nodes, vec!["S", "H", "T"]);
    }

    #[tokio::test]
    async fn test_find_path_same_node_and_cycle() {
        let engine = engine(fixtures::cycle());
        let same = engine.find_path("A", "A", 3, 0.0).await.unwrap();
        assert!(same.found);
        assert_eq!(same.length, 0);

        let path = engine.find_path("A", "D", 10, 0.0).await.unwrap();
        assert_eq!(path.length, 2);
    }

    #[tokio::test]
    async fn test_find_path_errors() {
        let engine = engine(fixtures::chain());
        assert!(matches!(
            engine.find_path("A", "D", 11, 0.0).await,
            Err(AppError::BoundsExceeded { .. })
        ));
        assert!(matches!(
            engine.find_path("A", "missing", 3, 0.0).await,
            Err(AppError::NotFound { .. })
        ));
    }
}
