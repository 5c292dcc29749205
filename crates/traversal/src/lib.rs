//! GraphRAG traversal
//!
//! Provides:
//! - `AnchorLocator`: picks traversal start nodes by embedding similarity
//! - `GraphTraversalEngine`: bounded, cycle-safe exploration of the knowledge graph
//!   (expansion, edge-type walks, shortest paths, derivation chains, neighbors)

mod anchors;
mod engine;

pub use anchors::{Anchor, AnchorLocator};
pub use engine::{
    AncestorChain, EdgeTypeTraversal, GraphTraversalEngine, Neighbor, NeighborhoodStats,
    PathResult,
};

/// Hard ceiling on expansion depth
pub const HARD_MAX_EXPAND_DEPTH: u32 = 5;

/// Hard ceiling on shortest-path depth
pub const HARD_MAX_PATH_DEPTH: u32 = 10;

/// Hard ceiling on derivation chain length
pub const HARD_MAX_ANCESTOR_DEPTH: u32 = 20;

/// Hard ceiling on nodes in any result
pub const HARD_MAX_RESULT_NODES: usize = 1000;

#[cfg(test)]
pub(crate) mod fixtures {
    use graphrag_common::store::InMemoryGraph;
    use graphrag_common::{Edge, Node};

    /// A -> B (0.8), A -> C (0.3)
    pub fn fan() -> InMemoryGraph {
        InMemoryGraph::new()
            .with_node(Node::new("A", "Claim", 0.92))
            .with_node(Node::new("B", "Claim", 0.9))
            .with_node(Node::new("C", "Claim", 0.9))
            .with_edge(Edge::new("A-B", "SUPPORTS", "A", "B", 0.8))
            .with_edge(Edge::new("A-C", "SUPPORTS", "A", "C", 0.3))
    }

    /// A -> B -> C -> D, every edge 1.0
    pub fn chain() -> InMemoryGraph {
        let mut graph = InMemoryGraph::new();
        for id in ["A", "B", "C", "D"] {
            graph.add_node(Node::new(id, "Claim", 1.0));
        }
        for (from, to) in [("A", "B"), ("B", "C"), ("C", "D")] {
            graph.add_edge(Edge::new(format!("{}-{}", from, to), "LINK", from, to, 1.0));
        }
        graph
    }

    /// A -> B -> C -> A plus C -> D
    pub fn cycle() -> InMemoryGraph {
        let mut graph = InMemoryGraph::new();
        for id in ["A", "B", "C", "D"] {
            graph.add_node(Node::new(id, "Claim", 0.9));
        }
        for (from, to) in [("A", "B"), ("B", "C"), ("C", "A"), ("C", "D")] {
            graph.add_edge(Edge::new(format!("{}-{}", from, to), "LINK", from, to, 0.9));
        }
        graph
    }

    /// Leaf -DERIVED_FROM-> Mid -DERIVED_FROM-> Root (verified)
    pub fn lineage() -> InMemoryGraph {
        InMemoryGraph::new()
            .with_node(Node::new("Root", "Source", 1.0).verified())
            .with_node(Node::new("Mid", "Claim", 0.8))
            .with_node(Node::new("Leaf", "Claim", 0.6))
            .with_edge(Edge::new("Mid-Root", "DERIVED_FROM", "Mid", "Root", 1.0))
            .with_edge(Edge::new("Leaf-Mid", "DERIVED_FROM", "Leaf", "Mid", 1.0))
    }
}
