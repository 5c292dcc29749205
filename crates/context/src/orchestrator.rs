//! Retrieval pipeline
//!
//! `EmbedQuery -> LocateAnchors -> Traverse -> AssembleContext -> GenerateResponse
//! -> ExtractCitations -> Done`, short-circuiting from `CacheLookup` straight to
//! `Done` on a full-result hit. Every external call runs under a timeout; a failure
//! aborts the remaining stages and is returned tagged with its stage.

use crate::assembler::ContextAssembler;
use crate::cache::ResultCache;
use crate::citations::{extract_citations, Citation};
use chrono::{DateTime, Utc};
use graphrag_common::cache::CacheKeyBuilder;
use graphrag_common::config::RetrievalConfig;
use graphrag_common::errors::{AppError, PipelineStage, Result};
use graphrag_common::llm::{ChatMessage, CompletionParams};
use graphrag_common::metrics::{record_completion, record_query, record_stage};
use graphrag_common::{Completer, Direction, Node, Subgraph};
use graphrag_traversal::{Anchor, AnchorLocator, GraphTraversalEngine};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const DEFAULT_SYSTEM_PROMPT: &str = "You answer questions using only the knowledge-graph context provided. \
Every context entry starts with a citation token such as [Node-1]. Cite the token of each entry you rely on, \
inline, right after the statement it supports. If the context does not contain the answer, say so.";

/// Per-request overrides of the configured retrieval defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOverrides {
    pub anchor_limit: Option<usize>,
    pub similarity_threshold: Option<f32>,
    pub verified_only: Option<bool>,
    pub depth: Option<u32>,
    pub direction: Option<Direction>,
    pub min_veracity: Option<f32>,
    pub max_nodes: Option<usize>,
    pub token_budget: Option<usize>,
    /// Skip the full-result cache for this request
    #[serde(default)]
    pub bypass_cache: bool,
}

/// Fully resolved request parameters
#[derive(Debug, Clone)]
struct QueryParams {
    anchor_limit: usize,
    similarity_threshold: f32,
    verified_only: bool,
    depth: u32,
    direction: Direction,
    min_veracity: f32,
    max_nodes: usize,
    token_budget: usize,
}

/// Wall-clock duration of one pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: PipelineStage,
    pub duration_ms: f64,
}

/// Answer plus everything it was grounded on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub request_id: Uuid,
    pub query: String,
    pub response: String,
    pub anchors: Vec<Anchor>,
    pub subgraph: Subgraph,
    pub citations: Vec<Citation>,
    /// Model output had unusable citation tokens; `response` is the raw text
    pub citations_recovered: bool,
    pub context_tokens: usize,
    /// Pinned nodes alone exceeded the token budget
    pub context_over_budget: bool,
    /// Subgraph nodes left out of the prompt by the token budget
    pub context_dropped_nodes: usize,
    /// Subgraph edges left out of the prompt by the token budget
    pub context_dropped_edges: usize,
    pub model: String,
    pub timings: Vec<StageTiming>,
    pub total_ms: f64,
    pub cached: bool,
    pub generated_at: DateTime<Utc>,
}

/// Records stage timings and tags failures with their stage
#[derive(Default)]
struct StageClock {
    timings: Vec<StageTiming>,
}

impl StageClock {
    async fn run<T, F>(&mut self, stage: PipelineStage, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let result = fut.await;
        let elapsed = start.elapsed();
        record_stage(stage.as_str(), elapsed);
        self.timings.push(StageTiming {
            stage,
            duration_ms: elapsed.as_secs_f64() * 1000.0,
        });
        result.map_err(|e| e.at_stage(stage))
    }
}

/// Run `fut` under `limit`
async fn with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout {
            operation: operation.to_string(),
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}

pub struct RetrievalOrchestrator {
    locator: AnchorLocator,
    engine: Arc<GraphTraversalEngine>,
    assembler: ContextAssembler,
    completer: Arc<dyn Completer>,
    cache: Arc<ResultCache>,
    config: RetrievalConfig,
}

impl RetrievalOrchestrator {
    pub fn new(
        locator: AnchorLocator,
        engine: Arc<GraphTraversalEngine>,
        completer: Arc<dyn Completer>,
        cache: Arc<ResultCache>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            locator,
            engine,
            assembler: ContextAssembler::new(),
            completer,
            cache,
            config,
        }
    }

    pub fn engine(&self) -> &Arc<GraphTraversalEngine> {
        &self.engine
    }

    pub fn locator(&self) -> &AnchorLocator {
        &self.locator
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    fn resolve(&self, overrides: &QueryOverrides) -> Result<QueryParams> {
        let limits = self.engine.config();
        let params = QueryParams {
            anchor_limit: overrides.anchor_limit.unwrap_or(self.config.anchor_limit),
            similarity_threshold: overrides
                .similarity_threshold
                .unwrap_or(self.config.similarity_threshold),
            verified_only: overrides.verified_only.unwrap_or(self.config.verified_only),
            depth: overrides
                .depth
                .unwrap_or(self.config.depth.min(limits.max_expand_depth)),
            direction: overrides.direction.unwrap_or_default(),
            min_veracity: overrides.min_veracity.unwrap_or(self.config.min_veracity),
            max_nodes: overrides
                .max_nodes
                .unwrap_or(self.config.max_nodes.min(limits.max_result_nodes)),
            token_budget: overrides.token_budget.unwrap_or(self.config.token_budget),
        };

        if params.depth > limits.max_expand_depth {
            return Err(AppError::BoundsExceeded {
                parameter: "depth".to_string(),
                requested: params.depth as usize,
                ceiling: limits.max_expand_depth as usize,
            });
        }
        if params.max_nodes > limits.max_result_nodes {
            return Err(AppError::BoundsExceeded {
                parameter: "max_nodes".to_string(),
                requested: params.max_nodes,
                ceiling: limits.max_result_nodes,
            });
        }
        if params.anchor_limit > limits.max_result_nodes {
            return Err(AppError::BoundsExceeded {
                parameter: "anchor_limit".to_string(),
                requested: params.anchor_limit,
                ceiling: limits.max_result_nodes,
            });
        }
        for (field, value) in [
            ("similarity_threshold", params.similarity_threshold),
            ("min_veracity", params.min_veracity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(AppError::Validation {
                    message: format!("{} must be within [0, 1]", field),
                    field: Some(field.to_string()),
                });
            }
        }
        Ok(params)
    }

    fn response_key(query_text: &str, pinned: &[String], params: &QueryParams) -> String {
        CacheKeyBuilder::new("query")
            .text("query", query_text)
            .sequence("pinned", pinned)
            .number("anchor_limit", params.anchor_limit)
            .float("similarity_threshold", params.similarity_threshold)
            .flag("verified_only", params.verified_only)
            .number("depth", params.depth)
            .number("direction", params.direction)
            .float("min_veracity", params.min_veracity)
            .number("max_nodes", params.max_nodes)
            .number("token_budget", params.token_budget)
            .build()
    }

    fn traversal_key(seeds: &[String], params: &QueryParams) -> String {
        CacheKeyBuilder::new("traversal")
            .ids("seeds", seeds)
            .number("depth", params.depth)
            .number("direction", params.direction)
            .float("min_veracity", params.min_veracity)
            .number("max_nodes", params.max_nodes)
            .build()
    }

    /// Answer `query_text` from the graph
    #[instrument(skip(self, pinned_node_ids, overrides), fields(pinned = pinned_node_ids.len()))]
    pub async fn query(
        &self,
        query_text: &str,
        pinned_node_ids: &[String],
        overrides: &QueryOverrides,
    ) -> Result<QueryResponse> {
        let started = Instant::now();
        let result = self.run(query_text, pinned_node_ids, overrides, started).await;

        let outcome = match &result {
            Ok(response) if response.cached => "cache_hit",
            Ok(_) => "ok",
            Err(_) => "error",
        };
        record_query(started.elapsed(), outcome);
        if let Err(e) = &result {
            warn!(error = %e, stage = ?e.stage(), "Query failed");
        }
        result
    }

    async fn run(
        &self,
        query_text: &str,
        pinned_node_ids: &[String],
        overrides: &QueryOverrides,
        started: Instant,
    ) -> Result<QueryResponse> {
        if query_text.trim().is_empty() {
            return Err(AppError::Validation {
                message: "Query text must not be empty".to_string(),
                field: Some("query".to_string()),
            });
        }
        let params = self.resolve(overrides)?;
        let mut clock = StageClock::default();

        let response_key = Self::response_key(query_text, pinned_node_ids, &params);
        let use_cache = self.cache.enabled() && !overrides.bypass_cache;
        if use_cache {
            let cached = clock
                .run(PipelineStage::CacheLookup, async {
                    Ok(self.cache.get::<QueryResponse>(&response_key).await)
                })
                .await?;
            if let Some(mut response) = cached {
                debug!("Full result served from cache");
                response.request_id = Uuid::now_v7();
                response.cached = true;
                response.timings = clock.timings;
                response.total_ms = started.elapsed().as_secs_f64() * 1000.0;
                return Ok(response);
            }
        }

        let embedding_timeout = self.config.embedding_timeout();
        let store_timeout = self.config.store_timeout();
        let completion_timeout = self.config.completion_timeout();

        let embedding = clock
            .run(
                PipelineStage::EmbedQuery,
                with_timeout("embed_query", embedding_timeout, self.locator.embed_query(query_text)),
            )
            .await?;

        let anchors = clock
            .run(
                PipelineStage::LocateAnchors,
                with_timeout(
                    "locate_anchors",
                    store_timeout,
                    self.locator.locate(
                        &embedding,
                        params.anchor_limit,
                        params.similarity_threshold,
                        params.verified_only,
                    ),
                ),
            )
            .await?;

        let seeds: Vec<String> = anchors.iter().map(|a| a.node.id.clone()).collect();
        let mut subgraph = clock
            .run(PipelineStage::Traverse, async {
                if seeds.is_empty() {
                    return Ok(Subgraph::empty(None));
                }
                let key = Self::traversal_key(&seeds, &params);
                if use_cache {
                    if let Some(hit) = self.cache.get::<Subgraph>(&key).await {
                        return Ok(hit);
                    }
                }
                let subgraph = with_timeout(
                    "traverse",
                    store_timeout,
                    self.engine.expand(
                        &seeds,
                        params.depth,
                        params.direction,
                        params.min_veracity,
                        params.max_nodes,
                    ),
                )
                .await?;
                if use_cache {
                    self.cache
                        .put(&key, &subgraph, subgraph.dependency_ids())
                        .await;
                }
                Ok(subgraph)
            })
            .await?;
        subgraph.query = Some(query_text.to_string());

        let context = clock
            .run(PipelineStage::AssembleContext, async {
                let pinned = self.load_pinned(pinned_node_ids, store_timeout).await?;
                Ok(self
                    .assembler
                    .assemble(query_text, &subgraph, &pinned, params.token_budget))
            })
            .await?;

        let messages = vec![
            ChatMessage::system(
                self.config
                    .system_prompt
                    .as_deref()
                    .unwrap_or(DEFAULT_SYSTEM_PROMPT),
            ),
            ChatMessage::user(build_prompt(query_text, &context.text)),
        ];
        let sampling = CompletionParams {
            temperature: self.config.temperature,
            max_tokens: self.config.max_output_tokens,
        };
        let answer = clock
            .run(PipelineStage::GenerateResponse, async {
                let start = Instant::now();
                let result = with_timeout(
                    "generate_response",
                    completion_timeout,
                    self.completer.complete(&messages, &sampling),
                )
                .await;
                record_completion(start.elapsed(), self.completer.model_name(), result.is_ok());
                result
            })
            .await?;

        let (citations, citations_recovered) = clock
            .run(PipelineStage::ExtractCitations, async {
                match extract_citations(&answer, &context) {
                    Ok(citations) => Ok((citations, false)),
                    Err(AppError::MalformedModelOutput { message }) => {
                        warn!(reason = %message, "Malformed citations in model output, returning raw text");
                        Ok((Vec::new(), true))
                    }
                    Err(e) => Err(e),
                }
            })
            .await?;

        let mut response = QueryResponse {
            request_id: Uuid::now_v7(),
            query: query_text.to_string(),
            response: answer,
            anchors,
            subgraph,
            citations,
            citations_recovered,
            context_tokens: context.token_estimate,
            context_over_budget: context.over_budget,
            context_dropped_nodes: context.dropped_nodes,
            context_dropped_edges: context.dropped_edges,
            model: self.completer.model_name().to_string(),
            timings: Vec::new(),
            total_ms: 0.0,
            cached: false,
            generated_at: Utc::now(),
        };

        clock
            .run(PipelineStage::Done, async {
                if use_cache {
                    let mut dependencies = response.subgraph.dependency_ids();
                    dependencies.extend(pinned_node_ids.iter().cloned());
                    self.cache.put(&response_key, &response, dependencies).await;
                }
                Ok(())
            })
            .await?;

        response.timings = clock.timings;
        response.total_ms = started.elapsed().as_secs_f64() * 1000.0;

        info!(
            anchors = response.anchors.len(),
            nodes = response.subgraph.nodes.len(),
            citations = response.citations.len(),
            total_ms = response.total_ms,
            "Query answered"
        );
        Ok(response)
    }

    /// Pinned nodes in request order; every id must exist
    async fn load_pinned(&self, ids: &[String], limit: Duration) -> Result<Vec<Node>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let found = with_timeout("load_pinned", limit, self.engine.store().get_nodes(ids)).await?;

        ids.iter()
            .map(|id| {
                found
                    .iter()
                    .find(|n| &n.id == id)
                    .map(|n| Node {
                        embedding: None,
                        ..n.clone()
                    })
                    .ok_or_else(|| AppError::node_not_found(id.clone()))
            })
            .collect()
    }
}

fn build_prompt(query_text: &str, context: &str) -> String {
    let context = if context.is_empty() {
        "(no relevant graph context was found)"
    } else {
        context
    };
    format!(
        "Context:\n{}\n\nQuestion: {}\n\nAnswer:",
        context,
        query_text.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use graphrag_common::cache::MemorySharedCache;
    use graphrag_common::config::{CacheSettings, TraversalConfig};
    use graphrag_common::embeddings::MockEmbedder;
    use graphrag_common::llm::MockCompleter;
    use graphrag_common::store::InMemoryGraph;
    use graphrag_common::{Edge, Embedder};

    const QUESTION: &str = "At what temperature does water boil?";

    struct Harness {
        orchestrator: RetrievalOrchestrator,
        graph: Arc<InMemoryGraph>,
        completer: Arc<MockCompleter>,
    }

    async fn graph() -> InMemoryGraph {
        let embedder = MockEmbedder::new(16);
        let question = embedder.embed(QUESTION).await.unwrap();
        let unrelated = embedder.embed("the history of medieval trade").await.unwrap();

        InMemoryGraph::new()
            .with_node(
                Node::new("A", "Claim", 0.92)
                    .with_property("text", "Water boils at 100C at sea level")
                    .with_embedding(question),
            )
            .with_node(Node::new("B", "Source", 0.9).with_property("text", "Physics handbook"))
            .with_node(Node::new("C", "Claim", 0.9).with_property("text", "Water boils at 90C"))
            .with_node(
                Node::new("Z", "Claim", 0.9)
                    .with_property("text", "Trade routes")
                    .with_embedding(unrelated),
            )
            .with_edge(Edge::new("A-B", "SUPPORTED_BY", "A", "B", 0.8))
            .with_edge(Edge::new("A-C", "CONTRADICTS", "A", "C", 0.3))
    }

    async fn harness_with(
        completer: Arc<MockCompleter>,
        embedder: Arc<dyn Embedder>,
        retrieval: RetrievalConfig,
    ) -> Harness {
        let graph = Arc::new(graph().await);
        let locator = AnchorLocator::new(embedder, graph.clone(), graph.clone());
        let engine = Arc::new(GraphTraversalEngine::new(graph.clone(), TraversalConfig::default()));
        let cache = Arc::new(ResultCache::new(
            CacheSettings::default(),
            Some(Arc::new(MemorySharedCache::new())),
        ));
        let orchestrator =
            RetrievalOrchestrator::new(locator, engine, completer.clone(), cache, retrieval);
        Harness {
            orchestrator,
            graph,
            completer,
        }
    }

    fn retrieval() -> RetrievalConfig {
        RetrievalConfig {
            similarity_threshold: 0.99,
            depth: 1,
            min_veracity: 0.5,
            ..Default::default()
        }
    }

    async fn harness() -> Harness {
        harness_with(
            Arc::new(MockCompleter::new()),
            Arc::new(MockEmbedder::new(16)),
            retrieval(),
        )
        .await
    }

    fn stages(response: &QueryResponse) -> Vec<PipelineStage> {
        response.timings.iter().map(|t| t.stage).collect()
    }

    #[tokio::test]
    async fn test_query_end_to_end() {
        let h = harness().await;
        let response = h
            .orchestrator
            .query(QUESTION, &[], &QueryOverrides::default())
            .await
            .unwrap();

        assert_eq!(response.anchors.len(), 1);
        assert_eq!(response.anchors[0].node.id, "A");

        let mut ids: Vec<&str> = response.subgraph.nodes.iter().map(|n| n.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["A", "B"]);
        assert_eq!(response.subgraph.edges.len(), 1);
        assert_eq!(response.subgraph.query.as_deref(), Some(QUESTION));

        assert_eq!(response.citations.len(), 1);
        assert_eq!(response.citations[0].node_id, "A");
        assert!(!response.citations_recovered);
        assert!(!response.cached);

        assert_eq!(
            stages(&response),
            vec![
                PipelineStage::CacheLookup,
                PipelineStage::EmbedQuery,
                PipelineStage::LocateAnchors,
                PipelineStage::Traverse,
                PipelineStage::AssembleContext,
                PipelineStage::GenerateResponse,
                PipelineStage::ExtractCitations,
                PipelineStage::Done,
            ]
        );

        let calls = h.completer.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0][1].content.contains("[Node-1] Claim"));
        assert!(calls[0][1].content.contains(QUESTION));
    }

    #[tokio::test]
    async fn test_cache_short_circuit_and_invalidation() {
        let h = harness().await;
        let overrides = QueryOverrides::default();

        let first = h.orchestrator.query(QUESTION, &[], &overrides).await.unwrap();
        let second = h.orchestrator.query(QUESTION, &[], &overrides).await.unwrap();

        assert!(second.cached);
        assert_eq!(stages(&second), vec![PipelineStage::CacheLookup]);
        assert_eq!(second.response, first.response);
        assert_eq!(h.completer.calls().len(), 1);

        let report = h.orchestrator.cache().invalidate(&["B".to_string()]).await;
        assert!(report.local_removed >= 1);

        let third = h.orchestrator.query(QUESTION, &[], &overrides).await.unwrap();
        assert!(!third.cached);
        assert_eq!(h.completer.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_bypass_cache() {
        let h = harness().await;
        let overrides = QueryOverrides {
            bypass_cache: true,
            ..Default::default()
        };
        h.orchestrator.query(QUESTION, &[], &overrides).await.unwrap();
        let again = h.orchestrator.query(QUESTION, &[], &overrides).await.unwrap();
        assert!(!again.cached);
        assert_eq!(h.completer.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_anchors_still_answers() {
        let h = harness().await;
        let response = h
            .orchestrator
            .query("completely unrelated question", &[], &QueryOverrides::default())
            .await
            .unwrap();

        assert!(response.anchors.is_empty());
        assert!(response.subgraph.is_empty());
        assert!(response.citations.is_empty());
        assert!(h.completer.calls()[0][1].content.contains("no relevant graph context"));
    }

    #[tokio::test]
    async fn test_pinned_nodes_lead_the_context() {
        let h = harness().await;
        let response = h
            .orchestrator
            .query(QUESTION, &["Z".to_string()], &QueryOverrides::default())
            .await
            .unwrap();

        // Echo completer cites the first token, which belongs to the pinned node
        assert_eq!(response.citations[0].node_id, "Z");
    }

    #[tokio::test]
    async fn test_pinned_order_is_part_of_the_key() {
        let h = harness().await;
        let zb = vec!["Z".to_string(), "B".to_string()];
        let bz = vec!["B".to_string(), "Z".to_string()];

        let first = h.orchestrator.query(QUESTION, &zb, &QueryOverrides::default()).await.unwrap();
        assert_eq!(first.citations[0].node_id, "Z");

        let second = h.orchestrator.query(QUESTION, &bz, &QueryOverrides::default()).await.unwrap();
        assert!(!second.cached);
        assert_eq!(second.citations[0].node_id, "B");

        let repeated = h.orchestrator.query(QUESTION, &zb, &QueryOverrides::default()).await.unwrap();
        assert!(repeated.cached);
        assert_eq!(repeated.citations[0].node_id, "Z");
    }

    #[tokio::test]
    async fn test_budget_drops_are_reported() {
        let h = harness().await;

        // Room for the anchor line only
        let tight = QueryOverrides {
            token_budget: Some(20),
            ..Default::default()
        };
        let response = h.orchestrator.query(QUESTION, &[], &tight).await.unwrap();
        assert_eq!(response.subgraph.nodes.len(), 2);
        assert!(!response.context_over_budget);
        assert_eq!(response.context_dropped_nodes, 1);
        assert_eq!(response.context_dropped_edges, 0);
        assert!(response.context_tokens <= 20);

        let prompt = &h.completer.calls()[0][1].content;
        assert!(prompt.contains("[Node-1] Claim"));
        assert!(!prompt.contains("[Node-2]"));
        assert!(!prompt.contains("Physics handbook"));

        // Both nodes fit, the edge line does not
        let edgeless = QueryOverrides {
            token_budget: Some(40),
            ..Default::default()
        };
        let response = h.orchestrator.query(QUESTION, &[], &edgeless).await.unwrap();
        assert_eq!(response.context_dropped_nodes, 0);
        assert_eq!(response.context_dropped_edges, 1);
        assert!(!h.completer.calls()[1][1].content.contains("SUPPORTED_BY"));

        let full = h
            .orchestrator
            .query(QUESTION, &[], &QueryOverrides::default())
            .await
            .unwrap();
        assert_eq!(full.context_dropped_nodes, 0);
        assert_eq!(full.context_dropped_edges, 0);
    }

    #[tokio::test]
    async fn test_unknown_pinned_node() {
        let h = harness().await;
        let err = tokio_test::assert_err!(
            h.orchestrator
                .query(QUESTION, &["ghost".to_string()], &QueryOverrides::default())
                .await
        );
        assert_eq!(err.stage(), Some(PipelineStage::AssembleContext));
        assert!(matches!(err.root(), AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_malformed_citations_recovered() {
        let h = harness_with(
            Arc::new(MockCompleter::replying("Water boils at 100C [Node-42].")),
            Arc::new(MockEmbedder::new(16)),
            retrieval(),
        )
        .await;
        let response = h
            .orchestrator
            .query(QUESTION, &[], &QueryOverrides::default())
            .await
            .unwrap();

        assert!(response.citations_recovered);
        assert!(response.citations.is_empty());
        assert_eq!(response.response, "Water boils at 100C [Node-42].");
    }

    #[tokio::test]
    async fn test_completion_failure_is_stage_tagged() {
        let h = harness_with(
            Arc::new(MockCompleter::unavailable()),
            Arc::new(MockEmbedder::new(16)),
            retrieval(),
        )
        .await;
        let err = h
            .orchestrator
            .query(QUESTION, &[], &QueryOverrides::default())
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(PipelineStage::GenerateResponse));
        assert!(matches!(err.root(), AppError::CompletionUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_store_outage_is_stage_tagged() {
        let h = harness().await;
        h.graph.set_offline(true);
        let err = h
            .orchestrator
            .query(QUESTION, &[], &QueryOverrides::default())
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(PipelineStage::LocateAnchors));
        assert!(matches!(err.root(), AppError::StoreUnavailable { .. }));
    }

    struct SlowEmbedder;

    #[async_trait]
    impl Embedder for SlowEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(vec![0.0; 16])
        }

        fn model_name(&self) -> &str {
            "slow"
        }

        fn dimension(&self) -> usize {
            16
        }
    }

    #[tokio::test]
    async fn test_embedding_timeout() {
        let h = harness_with(
            Arc::new(MockCompleter::new()),
            Arc::new(SlowEmbedder),
            RetrievalConfig {
                embedding_timeout_ms: 20,
                ..retrieval()
            },
        )
        .await;
        let err = h
            .orchestrator
            .query(QUESTION, &[], &QueryOverrides::default())
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(PipelineStage::EmbedQuery));
        assert!(matches!(err.root(), AppError::Timeout { timeout_ms: 20, .. }));
        assert!(h.completer.calls().is_empty());
    }

    #[tokio::test]
    async fn test_overrides_validated_before_any_stage() {
        let h = harness().await;
        let err = h
            .orchestrator
            .query(
                QUESTION,
                &[],
                &QueryOverrides {
                    depth: Some(9),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BoundsExceeded { requested: 9, .. }));

        let err = h
            .orchestrator
            .query("   ", &[], &QueryOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn test_cache_keys_normalized() {
        let params = QueryParams {
            anchor_limit: 5,
            similarity_threshold: 0.7,
            verified_only: false,
            depth: 2,
            direction: Direction::Both,
            min_veracity: 0.5,
            max_nodes: 200,
            token_budget: 3000,
        };
        let a = RetrievalOrchestrator::response_key(
            "What boils?",
            &["x".to_string(), "y".to_string()],
            &params,
        );
        let b = RetrievalOrchestrator::response_key(
            " what  boils? ",
            &["x".to_string(), "y".to_string()],
            &params,
        );
        assert_eq!(a, b);

        // Pinned order decides citation numbering
        let reordered = RetrievalOrchestrator::response_key(
            "What boils?",
            &["y".to_string(), "x".to_string()],
            &params,
        );
        assert_ne!(a, reordered);

        let deeper = QueryParams { depth: 3, ..params.clone() };
        assert_ne!(
            RetrievalOrchestrator::traversal_key(&["x".to_string()], &params),
            RetrievalOrchestrator::traversal_key(&["x".to_string()], &deeper)
        );
    }
}
