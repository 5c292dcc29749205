//! Derivation chains
//!
//! Each node has at most one designated backlink (by default `DERIVED_FROM`)
//! pointing at the node it was derived from. Following it repeatedly leads to a
//! root, normally a verified source.

use super::{check_bound, GraphTraversalEngine};
use graphrag_common::errors::{AppError, Result};
use graphrag_common::{Edge, Node};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, instrument, warn};

/// Chain from a node (distance 0) up to its furthest resolved ancestor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AncestorChain {
    pub node_id: String,

    /// Nodes annotated with their distance from `node_id`
    pub chain: Vec<Node>,

    /// Backlinks, `edges[i]` joins `chain[i]` to `chain[i + 1]`
    pub edges: Vec<Edge>,

    /// The last node in the chain is verified
    pub root_verified: bool,

    /// Stopped at `max_depth` with a further backlink pending
    pub truncated: bool,

    /// Stopped because a backlink pointed back into the chain
    pub cycle_detected: bool,
}

impl AncestorChain {
    pub fn root(&self) -> Option<&Node> {
        self.chain.last()
    }

    pub fn depth(&self) -> usize {
        self.edges.len()
    }
}

impl GraphTraversalEngine {
    #[instrument(skip(self))]
    pub async fn resolve_ancestors(&self, node_id: &str, max_depth: u32) -> Result<AncestorChain> {
        check_bound(
            "max_depth",
            max_depth as usize,
            self.config.max_ancestor_depth as usize,
        )?;

        let start = self
            .store
            .get_nodes(&[node_id.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::node_not_found(node_id))?;

        let edge_type = self.config.derivation_edge_type.as_str();
        let mut seen: HashSet<String> = HashSet::from([start.id.clone()]);
        let mut chain = vec![start.at_distance(0)];
        let mut edges = Vec::new();
        let mut truncated = false;
        let mut cycle_detected = false;

        loop {
            let current = match chain.last() {
                Some(node) => node.id.clone(),
                None => break,
            };
            let Some(edge) = self.store.derived_from(&current, edge_type).await? else {
                break;
            };

            let parent_id = edge.target_id.clone();
            if seen.contains(&parent_id) {
                warn!(node_id = %current, parent_id = %parent_id, "Derivation cycle");
                cycle_detected = true;
                break;
            }
            if edges.len() as u32 >= max_depth {
                truncated = true;
                break;
            }

            let Some(parent) = self
                .store
                .get_nodes(&[parent_id.clone()])
                .await?
                .into_iter()
                .next()
            else {
                warn!(node_id = %current, parent_id = %parent_id, "Dangling derivation edge");
                break;
            };

            seen.insert(parent_id);
            chain.push(parent.at_distance(edges.len() as u32 + 1));
            edges.push(edge);
        }

        let root_verified = chain.last().map(|n| n.verified).unwrap_or(false);
        debug!(depth = edges.len(), root_verified, truncated, "Ancestors resolved");

        Ok(AncestorChain {
            node_id: node_id.to_string(),
            chain,
            edges,
            root_verified,
            truncated,
            cycle_detected,
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

    fn summary(chain: &AncestorChain) -> Vec<(String, u32)> {
        chain
            .chain
            .iter()
            .map(|n| (n.id.clone(), n.distance.unwrap_or_default()))
            .collect()
    }

    #[tokio::test]
    async fn test_resolve_to_root() {
        let engine = engine(fixtures::lineage());
        let chain = engine.resolve_ancestors("Leaf", 5).await.unwrap();

        assert_eq!(
            summary(&chain),
            vec![
                ("Leaf".to_string(), 0),
                ("Mid".to_string(), 1),
                ("Root".to_string(), 2)
            ]
        );
        assert!(chain.root_verified);
        assert!(!chain.truncated);
        assert_eq!(chain.depth(), 2);
    }

    #[tokio::test]
    async fn test_resolve_truncated_at_depth() {
        let engine = engine(fixtures::lineage());
        let chain = engine.resolve_ancestors("Leaf", 1).await.unwrap();

        assert_eq!(chain.chain.len(), 2);
        assert!(chain.truncated);
        assert!(!chain.root_verified);
    }

    #[tokio::test]
    async fn test_resolve_root_itself() {
        let engine = engine(fixtures::lineage());
        let chain = engine.resolve_ancestors("Root", 5).await.unwrap();
        assert_eq!(chain.chain.len(), 1);
        assert!(chain.root_verified);
    }

    #[tokio::test]
    async fn test_resolve_stops_on_cycle() {
        let graph = InMemoryGraph::new()
            .with_node(Node::new("X", "Claim", 1.0))
            .with_node(Node::new("Y", "Claim", 1.0))
            .with_edge(Edge::new("X-Y", "DERIVED_FROM", "X", "Y", 1.0))
            .with_edge(Edge::new("Y-X", "DERIVED_FROM", "Y", "X", 1.0));
        let engine = engine(graph);

        let chain = engine.resolve_ancestors("X", 20).await.unwrap();
        assert_eq!(chain.chain.len(), 2);
        assert!(chain.cycle_detected);
    }

    #[tokio::test]
    async fn test_resolve_errors() {
        let engine = engine(fixtures::lineage());
        assert!(matches!(
            engine.resolve_ancestors("Leaf", 21).await,
            Err(AppError::BoundsExceeded { ceiling: 20, .. })
        ));
        assert!(matches!(
            engine.resolve_ancestors("ghost", 3).await,
            Err(AppError::NotFound { .. })
        ));
    }
}
