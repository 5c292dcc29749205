//! GraphRAG Common Library
//!
//! Shared code for the GraphRAG crates including:
//! - Graph model (nodes, edges, subgraphs, paths)
//! - Store client abstractions (vector index, graph store)
//! - Embedding and completion client abstractions
//! - Shared cache tier
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod cache;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod graph;
pub mod llm;
pub mod metrics;
pub mod store;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use graph::{Direction, Edge, Node, Path, PropertyValue, Subgraph};
pub use llm::Completer;
pub use store::{GraphStore, VectorIndex};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
