//! In-process graph store
//!
//! Implements both `GraphStore` and `VectorIndex` over adjacency lists. Used by
//! tests and by local development without a database.

use super::{cosine_similarity, GraphStore, TraversalQuery, TraversalRow, VectorHit, VectorIndex};
use crate::errors::{AppError, Result};
use crate::graph::{Direction, Edge, Node, Path};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// In-memory graph
#[derive(Default)]
pub struct InMemoryGraph {
    /// Nodes in insertion order
    nodes: Vec<Node>,

    /// node id -> position in `nodes`
    index: HashMap<String, usize>,

    /// Edges in insertion order
    edges: Vec<Edge>,

    /// node id -> positions of edges leaving it
    outgoing: HashMap<String, Vec<usize>>,

    /// node id -> positions of edges entering it
    incoming: HashMap<String, Vec<usize>>,

    /// Simulated outage
    offline: AtomicBool,

    /// Number of store queries served
    queries: AtomicUsize,
}

impl InMemoryGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node
    pub fn add_node(&mut self, node: Node) {
        match self.index.get(&node.id) {
            Some(&pos) => self.nodes[pos] = node,
            None => {
                self.index.insert(node.id.clone(), self.nodes.len());
                self.nodes.push(node);
            }
        }
    }

    /// Add an edge to the graph
    pub fn add_edge(&mut self, edge: Edge) {
        let pos = self.edges.len();
        self.outgoing.entry(edge.source_id.clone()).or_default().push(pos);
        self.incoming.entry(edge.target_id.clone()).or_default().push(pos);
        self.edges.push(edge);
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.add_node(node);
        self
    }

    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.add_edge(edge);
        self
    }

    /// Get node count
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Make every subsequent query fail with `StoreUnavailable`
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of queries served so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn begin_query(&self) -> Result<()> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::StoreUnavailable {
                message: "in-memory graph is offline".to_string(),
            });
        }
        Ok(())
    }

    /// Edges walkable from `node_id`, in insertion order
    fn walkable<'a>(
        &'a self,
        node_id: &str,
        direction: Direction,
    ) -> impl Iterator<Item = &'a Edge> + 'a {
        let mut positions: Vec<usize> = self
            .outgoing
            .get(node_id)
            .into_iter()
            .flatten()
            .chain(self.incoming.get(node_id).into_iter().flatten())
            .copied()
            .collect();
        positions.sort_unstable();
        positions.dedup();

        let node_id = node_id.to_string();
        positions
            .into_iter()
            .map(move |pos| &self.edges[pos])
            .filter(move |edge| edge.leaves(&node_id, direction))
    }
}

fn passes(edge: &Edge, min_veracity: f32, edge_type: Option<&str>) -> bool {
    edge.score() >= min_veracity && edge_type.map_or(true, |t| edge.edge_type == t)
}

#[async_trait]
impl GraphStore for InMemoryGraph {
    async fn get_nodes(&self, ids: &[String]) -> Result<Vec<Node>> {
        self.begin_query()?;
        let mut seen = HashSet::new();
        Ok(ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| self.index.get(id).map(|&pos| self.nodes[pos].clone()))
            .collect())
    }

    async fn neighbors(
        &self,
        ids: &[String],
        direction: Direction,
        min_veracity: f32,
        edge_type: Option<&str>,
    ) -> Result<Vec<Edge>> {
        self.begin_query()?;
        let mut seen = HashSet::new();
        let mut edges = Vec::new();
        for id in ids {
            for edge in self.walkable(id, direction) {
                if passes(edge, min_veracity, edge_type) && seen.insert(edge.id.as_str()) {
                    edges.push(edge.clone());
                }
            }
        }
        Ok(edges)
    }

    async fn bounded_traversal(&self, query: &TraversalQuery) -> Result<Vec<TraversalRow>> {
        self.begin_query()?;

        // Breadth-first over branches, mirroring a recursive CTE with a path array
        let mut rows = Vec::new();
        let mut queue: VecDeque<(String, Path)> = query
            .seed_ids
            .iter()
            .filter(|id| self.index.contains_key(*id))
            .map(|id| (id.clone(), Path::single(id.clone())))
            .collect();

        while let Some((seed_id, path)) = queue.pop_front() {
            if path.len() as u32 >= query.max_depth {
                continue;
            }
            let Some(current) = path.nodes.last().cloned() else {
                continue;
            };

            for edge in self.walkable(&current, query.direction) {
                if !passes(edge, query.min_veracity, query.edge_type.as_deref()) {
                    continue;
                }
                let Some(next) = edge.other_end(&current) else {
                    continue;
                };
                // A self-loop leads back onto the path and is rejected here too
                let Some(extended) = path.extend(edge, next) else {
                    continue;
                };

                if rows.len() >= query.max_rows {
                    return Ok(rows);
                }
                rows.push(TraversalRow {
                    seed_id: seed_id.clone(),
                    edge: edge.clone(),
                    path: extended.clone(),
                });
                queue.push_back((seed_id.clone(), extended));
            }
        }

        Ok(rows)
    }

    async fn derived_from(&self, node_id: &str, edge_type: &str) -> Result<Option<Edge>> {
        self.begin_query()?;
        Ok(self
            .walkable(node_id, Direction::Outgoing)
            .find(|e| e.edge_type == edge_type)
            .cloned())
    }
}

#[async_trait]
impl VectorIndex for InMemoryGraph {
    async fn nearest(
        &self,
        embedding: &[f32],
        min_similarity: f32,
        limit: usize,
        verified_only: bool,
    ) -> Result<Vec<VectorHit>> {
        self.begin_query()?;
        let mut hits: Vec<VectorHit> = self
            .nodes
            .iter()
            .filter(|n| !verified_only || n.verified)
            .filter_map(|n| {
                let vector = n.embedding.as_ref()?;
                let similarity = cosine_similarity(embedding, vector);
                (similarity >= min_similarity).then(|| VectorHit {
                    node_id: n.id.clone(),
                    similarity,
                })
            })
            .collect();

        // Stable sort keeps insertion order among ties
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle() -> InMemoryGraph {
        InMemoryGraph::new()
            .with_node(Node::new("a", "T", 1.0))
            .with_node(Node::new("b", "T", 1.0))
            .with_node(Node::new("c", "T", 1.0))
            .with_edge(Edge::new("ab", "LINK", "a", "b", 0.9))
            .with_edge(Edge::new("bc", "LINK", "b", "c", 0.8))
            .with_edge(Edge::new("ca", "LINK", "c", "a", 0.7))
    }

    fn query(seed: &str, depth: u32, direction: Direction) -> TraversalQuery {
        TraversalQuery {
            seed_ids: vec![seed.to_string()],
            max_depth: depth,
            min_veracity: 0.0,
            max_rows: 100,
            direction,
            edge_type: None,
        }
    }

    #[tokio::test]
    async fn test_traversal_terminates_on_cycle() {
        let graph = cycle();
        let rows = graph
            .bounded_traversal(&query("a", 10, Direction::Outgoing))
            .await
            .unwrap();

        // a->b, a->b->c; the hop back to a is on the path
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].reached(), "b");
        assert_eq!(rows[1].reached(), "c");
        assert_eq!(rows[1].depth(), 2);
    }

    #[tokio::test]
    async fn test_traversal_rows_shallowest_first_and_capped() {
        let graph = cycle();
        let mut q = query("a", 3, Direction::Both);
        let rows = graph.bounded_traversal(&q).await.unwrap();
        let depths: Vec<u32> = rows.iter().map(|r| r.depth()).collect();
        let mut sorted = depths.clone();
        sorted.sort();
        assert_eq!(depths, sorted);

        q.max_rows = 1;
        assert_eq!(graph.bounded_traversal(&q).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_neighbors_filters_veracity_and_direction() {
        let graph = cycle();
        let edges = graph
            .neighbors(&["a".to_string()], Direction::Both, 0.75, None)
            .await
            .unwrap();
        let ids: Vec<&str> = edges.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["ab"]);

        let incoming = graph
            .neighbors(&["a".to_string()], Direction::Incoming, 0.0, None)
            .await
            .unwrap();
        assert_eq!(incoming[0].id, "ca");
    }

    #[test]
    fn test_walkable_follows_direction() {
        let graph = cycle().with_edge(Edge::new("bb", "LINK", "b", "b", 0.5));
        let ids = |direction| {
            graph
                .walkable("b", direction)
                .map(|e| e.id.as_str())
                .collect::<Vec<_>>()
        };

        assert_eq!(ids(Direction::Outgoing), vec!["bc", "bb"]);
        assert_eq!(ids(Direction::Incoming), vec!["ab", "bb"]);
        // Self-loop listed once
        assert_eq!(ids(Direction::Both), vec!["ab", "bc", "bb"]);
    }

    #[tokio::test]
    async fn test_offline_store() {
        let graph = cycle();
        graph.set_offline(true);
        let err = tokio_test::assert_err!(graph.get_nodes(&["a".to_string()]).await);
        assert!(matches!(err, AppError::StoreUnavailable { .. }));
        assert_eq!(graph.query_count(), 1);
    }

    #[tokio::test]
    async fn test_nearest_ranks_and_filters() {
        let graph = InMemoryGraph::new()
            .with_node(Node::new("x", "T", 1.0).with_embedding(vec![1.0, 0.0]))
            .with_node(Node::new("y", "T", 1.0).with_embedding(vec![0.8, 0.6]).verified())
            .with_node(Node::new("z", "T", 1.0).with_embedding(vec![0.0, 1.0]));

        let hits = graph.nearest(&[1.0, 0.0], 0.5, 10, false).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.node_id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y"]);

        let verified = graph.nearest(&[1.0, 0.0], 0.5, 10, true).await.unwrap();
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].node_id, "y");
    }
}
