//! Graph model shared by every GraphRAG crate
//!
//! Provides:
//! - `Node` / `Edge` entities as read from the graph store
//! - `Subgraph` and `Path` traversal results
//! - `PropertyValue`, a closed variant type for entity payloads
//! - Veracity clamping helpers

mod properties;

pub use properties::{Properties, PropertyValue};
pub(crate) use properties::properties_from_json;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

/// Clamp a veracity/weight value into [0, 1]. NaN collapses to 0.
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Graph entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Opaque identifier
    pub id: String,

    /// Type identifier (e.g. "Claim", "Source")
    pub node_type: String,

    /// Arbitrary payload
    #[serde(default)]
    pub properties: Properties,

    /// Trust score in [0, 1]
    pub veracity: f32,

    /// Level-0 node: independently verified
    #[serde(default)]
    pub verified: bool,

    /// Embedding vector, when loaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Hop distance from the traversal seeds. Only set on traversal output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<u32>,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>, veracity: f32) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            properties: Properties::new(),
            veracity: clamp_unit(veracity),
            verified: false,
            embedding: None,
            distance: None,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn verified(mut self) -> Self {
        self.verified = true;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Clamped veracity
    pub fn score(&self) -> f32 {
        clamp_unit(self.veracity)
    }

    /// Copy annotated with a traversal distance, embedding stripped
    pub fn at_distance(&self, distance: u32) -> Self {
        Self {
            embedding: None,
            distance: Some(distance),
            ..self.clone()
        }
    }
}

/// Directed relationship between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub edge_type: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(default)]
    pub properties: Properties,
    /// Trust score in [0, 1]
    pub veracity: f32,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        edge_type: impl Into<String>,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        veracity: f32,
    ) -> Self {
        Self {
            id: id.into(),
            edge_type: edge_type.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            properties: Properties::new(),
            veracity: clamp_unit(veracity),
        }
    }

    /// Clamped veracity
    pub fn score(&self) -> f32 {
        clamp_unit(self.veracity)
    }

    /// The endpoint opposite `node_id`, if `node_id` is an endpoint
    pub fn other_end(&self, node_id: &str) -> Option<&str> {
        if self.source_id == node_id {
            Some(&self.target_id)
        } else if self.target_id == node_id {
            Some(&self.source_id)
        } else {
            None
        }
    }

    /// Whether the edge can be walked from `node_id` in `direction`
    pub fn leaves(&self, node_id: &str, direction: Direction) -> bool {
        match direction {
            Direction::Outgoing => self.source_id == node_id,
            Direction::Incoming => self.target_id == node_id,
            Direction::Both => self.source_id == node_id || self.target_id == node_id,
        }
    }
}

/// Edge direction followed during expansion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Follow edges from source to target
    Outgoing,
    /// Follow edges from target to source
    Incoming,
    /// Treat edges as undirected
    #[default]
    Both,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Outgoing => "outgoing",
            Direction::Incoming => "incoming",
            Direction::Both => "both",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "outgoing" | "out" | "forward" => Ok(Direction::Outgoing),
            "incoming" | "in" | "backward" => Ok(Direction::Incoming),
            "both" | "undirected" => Ok(Direction::Both),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

/// Self-contained traversal result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    /// Nodes, unique by id, annotated with their minimum distance
    pub nodes: Vec<Node>,

    /// Edges, unique by id, both endpoints present in `nodes`
    pub edges: Vec<Edge>,

    /// Seeds the traversal started from
    pub anchor_ids: Vec<String>,

    /// Originating query text, for provenance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    /// Set when a node or row cap cut the expansion short
    #[serde(default)]
    pub truncated: bool,
}

impl Subgraph {
    pub fn empty(query: Option<String>) -> Self {
        Self {
            query,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    /// Every edge's endpoints are present in the node set
    pub fn is_closed(&self) -> bool {
        let ids: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        self.edges
            .iter()
            .all(|e| ids.contains(e.source_id.as_str()) && ids.contains(e.target_id.as_str()))
    }

    /// Node and edge ids this result was derived from
    pub fn dependency_ids(&self) -> BTreeSet<String> {
        self.nodes
            .iter()
            .map(|n| n.id.clone())
            .chain(self.edges.iter().map(|e| e.id.clone()))
            .collect()
    }
}

/// Cycle-free walk through the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    /// Ordered node ids, no repeats
    pub nodes: Vec<String>,

    /// Edge ids connecting consecutive nodes
    pub edges: Vec<String>,

    /// Product of traversed edge weights
    pub weight: f32,
}

impl Path {
    /// Zero-length path sitting on a single node
    pub fn single(node_id: impl Into<String>) -> Self {
        Self {
            nodes: vec![node_id.into()],
            edges: Vec::new(),
            weight: 1.0,
        }
    }

    /// Number of hops
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.iter().any(|n| n == node_id)
    }

    /// Extend by one hop. Returns `None` if `node_id` is already on the path.
    pub fn extend(&self, edge: &Edge, node_id: &str) -> Option<Self> {
        if self.contains(node_id) {
            return None;
        }
        let mut nodes = self.nodes.clone();
        nodes.push(node_id.to_string());
        let mut edges = self.edges.clone();
        edges.push(edge.id.clone());
        Some(Self {
            nodes,
            edges,
            weight: clamp_unit(self.weight * edge.score()),
        })
    }
}
