//! Context assembly
//!
//! Serializes pinned nodes, then subgraph nodes in relevance order, then the edges
//! between cited nodes into a prompt block. Every node entry gets a citation token
//! (`[Node-1]`, `[Node-2]`, ...) that the model is asked to cite. Entries that do not
//! fit the token budget are dropped whole.

use crate::citations::citation_token;
use graphrag_common::{Edge, Node, Subgraph};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Character-based token estimate: one token per four characters, rounded up
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// One serialized node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub token: String,
    pub node_id: String,
    pub pinned: bool,
    pub tokens: usize,
}

/// Prompt-ready context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentedContext {
    pub query: String,

    /// Serialized context block
    pub text: String,

    /// Included node entries, in order
    pub entries: Vec<ContextEntry>,

    /// Citation token -> node id
    pub citations: BTreeMap<String, String>,

    /// Edge lines included
    pub edge_count: usize,

    /// Estimated tokens of `text`
    pub token_estimate: usize,

    pub token_budget: usize,

    /// Subgraph nodes left out for budget
    pub dropped_nodes: usize,

    /// Edge lines left out for budget
    pub dropped_edges: usize,

    /// Pinned nodes alone exceed the budget
    pub over_budget: bool,
}

impl AugmentedContext {
    /// Node id behind a citation token
    pub fn resolve(&self, token: &str) -> Option<&str> {
        self.citations.get(token).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds `AugmentedContext` from a subgraph
#[derive(Debug, Clone, Default)]
pub struct ContextAssembler;

impl ContextAssembler {
    pub fn new() -> Self {
        Self
    }

    pub fn assemble(
        &self,
        query_text: &str,
        subgraph: &Subgraph,
        pinned_nodes: &[Node],
        token_budget: usize,
    ) -> AugmentedContext {
        let mut lines: Vec<String> = Vec::new();
        let mut entries: Vec<ContextEntry> = Vec::new();
        let mut citations = BTreeMap::new();
        let mut token_of: HashMap<String, String> = HashMap::new();
        let mut used = 0usize;

        // Pinned first, always included
        for node in pinned_nodes {
            if token_of.contains_key(&node.id) {
                continue;
            }
            let token = citation_token(entries.len() + 1);
            let line = node_line(&token, node);
            let tokens = estimate_tokens(&line) + 1;
            used += tokens;
            token_of.insert(node.id.clone(), token.clone());
            citations.insert(token.clone(), node.id.clone());
            entries.push(ContextEntry {
                token,
                node_id: node.id.clone(),
                pinned: true,
                tokens,
            });
            lines.push(line);
        }
        let over_budget = used > token_budget;

        // Closer first, then more trusted. Stable, so store order breaks ties.
        let mut ranked: Vec<&Node> = subgraph
            .nodes
            .iter()
            .filter(|n| !token_of.contains_key(&n.id))
            .collect();
        ranked.sort_by(|a, b| {
            a.distance
                .unwrap_or(u32::MAX)
                .cmp(&b.distance.unwrap_or(u32::MAX))
                .then_with(|| b.score().total_cmp(&a.score()))
        });

        let mut dropped_nodes = 0;
        let mut budget_hit = over_budget;
        for node in ranked {
            if token_of.contains_key(&node.id) {
                continue;
            }
            if budget_hit {
                dropped_nodes += 1;
                continue;
            }
            let token = citation_token(entries.len() + 1);
            let line = node_line(&token, node);
            let tokens = estimate_tokens(&line) + 1;
            if used + tokens > token_budget {
                budget_hit = true;
                dropped_nodes += 1;
                continue;
            }
            used += tokens;
            token_of.insert(node.id.clone(), token.clone());
            citations.insert(token.clone(), node.id.clone());
            entries.push(ContextEntry {
                token,
                node_id: node.id.clone(),
                pinned: false,
                tokens,
            });
            lines.push(line);
        }

        // Edges between cited nodes, strongest first
        let mut edges: Vec<&Edge> = subgraph
            .edges
            .iter()
            .filter(|e| token_of.contains_key(&e.source_id) && token_of.contains_key(&e.target_id))
            .collect();
        edges.sort_by(|a, b| b.score().total_cmp(&a.score()).then_with(|| a.id.cmp(&b.id)));

        let mut seen_edges = HashSet::new();
        let mut edge_count = 0;
        let mut dropped_edges = 0;
        for edge in edges {
            if !seen_edges.insert(edge.id.as_str()) {
                continue;
            }
            if budget_hit {
                dropped_edges += 1;
                continue;
            }
            let line = format!(
                "{} --[{}]--> {}",
                token_of[&edge.source_id], edge.edge_type, token_of[&edge.target_id]
            );
            let tokens = estimate_tokens(&line) + 1;
            if used + tokens > token_budget {
                budget_hit = true;
                dropped_edges += 1;
                continue;
            }
            used += tokens;
            edge_count += 1;
            lines.push(line);
        }

        let text = lines.join("\n");
        let token_estimate = estimate_tokens(&text);

        debug!(
            entries = entries.len(),
            edges = edge_count,
            dropped_nodes,
            dropped_edges,
            token_estimate,
            token_budget,
            "Context assembled"
        );

        AugmentedContext {
            query: query_text.to_string(),
            text,
            entries,
            citations,
            edge_count,
            token_estimate,
            token_budget,
            dropped_nodes,
            dropped_edges,
            over_budget,
        }
    }
}

/// `[Node-1] Claim (veracity 0.92, verified) | title: ... | year: 2021`
fn node_line(token: &str, node: &Node) -> String {
    let mut line = format!("{} {} (veracity {:.2}", token, node.node_type, node.score());
    if node.verified {
        line.push_str(", verified");
    }
    line.push(')');
    for (key, value) in &node.properties {
        line.push_str(" | ");
        line.push_str(key);
        line.push_str(": ");
        line.push_str(&value.to_string());
    }
    line
}
