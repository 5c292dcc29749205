//! Anchor location
//!
//! Embeds the query text and picks the closest graph nodes as traversal seeds.

use graphrag_common::errors::{AppError, Result};
use graphrag_common::metrics::record_embedding;
use graphrag_common::{Embedder, GraphStore, Node, VectorIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

/// Traversal start node with its relevance to the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub node: Node,
    /// Cosine similarity to the query embedding
    pub score: f32,
}

/// Locates anchor nodes for a query
pub struct AnchorLocator {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn GraphStore>,
}

impl AnchorLocator {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn GraphStore>,
    ) -> Self {
        Self {
            embedder,
            index,
            store,
        }
    }

    /// Embed the query text. Embedding failures are surfaced as-is, never retried.
    pub async fn embed_query(&self, query_text: &str) -> Result<Vec<f32>> {
        if query_text.trim().is_empty() {
            return Err(AppError::Validation {
                message: "Query text must not be empty".to_string(),
                field: Some("query".to_string()),
            });
        }

        let start = Instant::now();
        let result = self.embedder.embed(query_text).await;
        record_embedding(start.elapsed(), self.embedder.model_name(), result.is_ok());
        result
    }

    /// Nodes nearest to `embedding`, most similar first
    #[instrument(skip(self, embedding), fields(dim = embedding.len()))]
    pub async fn locate(
        &self,
        embedding: &[f32],
        limit: usize,
        similarity_threshold: f32,
        verified_only: bool,
    ) -> Result<Vec<Anchor>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let hits = self
            .index
            .nearest(embedding, similarity_threshold, limit, verified_only)
            .await?;
        if hits.is_empty() {
            debug!("No anchors above similarity threshold");
            return Ok(Vec::new());
        }

        let ids: Vec<String> = hits.iter().map(|h| h.node_id.clone()).collect();
        let mut nodes: HashMap<String, Node> = self
            .store
            .get_nodes(&ids)
            .await?
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect();

        // Keep index order; a hit whose node vanished since indexing is skipped
        let anchors: Vec<Anchor> = hits
            .into_iter()
            .filter_map(|hit| {
                nodes.remove(&hit.node_id).map(|mut node| {
                    node.embedding = None;
                    Anchor {
                        node,
                        score: hit.similarity,
                    }
                })
            })
            .take(limit)
            .collect();

        debug!(count = anchors.len(), "Anchors located");
        Ok(anchors)
    }

    /// Embed then locate
    pub async fn find_anchors(
        &self,
        query_text: &str,
        limit: usize,
        similarity_threshold: f32,
        verified_only: bool,
    ) -> Result<Vec<Anchor>> {
        let embedding = self.embed_query(query_text).await?;
        self.locate(&embedding, limit, similarity_threshold, verified_only)
            .await
    }
}
