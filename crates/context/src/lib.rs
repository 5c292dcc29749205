//! GraphRAG Context Engine
//!
//! Turns a retrieved subgraph into an answer:
//! - Context assembly under a token budget with stable citation tokens
//! - Citation extraction from model output
//! - Two-tier result caching with dependency-based invalidation
//! - The end-to-end retrieval pipeline

mod assembler;
mod cache;
mod citations;
mod orchestrator;

pub use assembler::{estimate_tokens, AugmentedContext, ContextAssembler, ContextEntry};
pub use cache::{InvalidationReport, ResultCache};
pub use citations::{citation_token, extract_citations, Citation};
pub use orchestrator::{QueryOverrides, QueryResponse, RetrievalOrchestrator, StageTiming};
