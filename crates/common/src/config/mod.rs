//! Configuration management for GraphRAG services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Graph/vector store database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Redis configuration (shared cache tier)
    #[serde(default)]
    pub redis: RedisConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Completion (chat) service configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Traversal defaults and hard ceilings
    #[serde(default)]
    pub traversal: TraversalConfig,

    /// Result cache configuration
    #[serde(default)]
    pub cache: CacheSettings,

    /// Retrieval pipeline defaults
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RedisConfig {
    /// Redis URL. Unset disables the shared cache tier.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Completion provider: openai, mock
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API key
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TraversalConfig {
    /// Hard ceiling on expansion depth
    #[serde(default = "default_max_expand_depth")]
    pub max_expand_depth: u32,

    /// Hard ceiling on total path-finding depth
    #[serde(default = "default_max_path_depth")]
    pub max_path_depth: u32,

    /// Hard ceiling on ancestor-chain depth
    #[serde(default = "default_max_ancestor_depth")]
    pub max_ancestor_depth: u32,

    /// Hard ceiling on result node count
    #[serde(default = "default_max_result_nodes")]
    pub max_result_nodes: usize,

    /// Row cap passed to the store for bounded traversals
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Edge type holding the single "derived-from" backlink
    #[serde(default = "default_derivation_edge_type")]
    pub derivation_edge_type: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheSettings {
    /// Enable result caching
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// In-process tier TTL in seconds
    #[serde(default = "default_local_ttl")]
    pub local_ttl_secs: u64,

    /// Shared tier TTL in seconds
    #[serde(default = "default_shared_ttl")]
    pub shared_ttl_secs: u64,

    /// Interval of the in-process expiry sweep in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Maximum in-process entries
    #[serde(default = "default_local_capacity")]
    pub local_capacity: usize,

    /// Key prefix for namespacing in the shared tier
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Maximum anchors located per query
    #[serde(default = "default_anchor_limit")]
    pub anchor_limit: usize,

    /// Minimum cosine similarity for an anchor
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Only accept verified nodes as anchors
    #[serde(default)]
    pub verified_only: bool,

    /// Expansion depth from anchors
    #[serde(default = "default_depth")]
    pub depth: u32,

    /// Minimum edge veracity followed during expansion
    #[serde(default = "default_min_veracity")]
    pub min_veracity: f32,

    /// Node cap for the expansion
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,

    /// Token budget for the assembled context
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens generated by the model
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: usize,

    /// System instruction override
    pub system_prompt: Option<String>,

    /// Timeout for the embedding call in milliseconds
    #[serde(default = "default_embedding_timeout_ms")]
    pub embedding_timeout_ms: u64,

    /// Timeout for each store query in milliseconds
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Timeout for the completion call in milliseconds
    #[serde(default = "default_completion_timeout_ms")]
    pub completion_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 60 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_database_url() -> String { "postgres://localhost/graphrag".to_string() }
fn default_max_connections() -> u32 { 50 }
fn default_min_connections() -> u32 { 5 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_timeout() -> u64 { 10 }
fn default_llm_model() -> String { "gpt-4o-mini".to_string() }
fn default_llm_timeout() -> u64 { 30 }
fn default_max_expand_depth() -> u32 { 5 }
fn default_max_path_depth() -> u32 { 10 }
fn default_max_ancestor_depth() -> u32 { 20 }
fn default_max_result_nodes() -> usize { 1000 }
fn default_max_rows() -> usize { 5000 }
fn default_derivation_edge_type() -> String { "DERIVED_FROM".to_string() }
fn default_enabled() -> bool { true }
fn default_local_ttl() -> u64 { 60 }
fn default_shared_ttl() -> u64 { 900 }
fn default_sweep_interval() -> u64 { 30 }
fn default_local_capacity() -> usize { 10_000 }
fn default_key_prefix() -> String { "graphrag".to_string() }
fn default_anchor_limit() -> usize { 5 }
fn default_similarity_threshold() -> f32 { 0.7 }
fn default_depth() -> u32 { 2 }
fn default_min_veracity() -> f32 { 0.5 }
fn default_max_nodes() -> usize { 200 }
fn default_token_budget() -> usize { 3000 }
fn default_temperature() -> f32 { 0.2 }
fn default_max_output_tokens() -> usize { 800 }
fn default_embedding_timeout_ms() -> u64 { 10_000 }
fn default_store_timeout_ms() -> u64 { 5_000 }
fn default_completion_timeout_ms() -> u64 { 30_000 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "graphrag".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__TRAVERSAL__MAX_EXPAND_DEPTH=4
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }
}

impl CacheSettings {
    pub fn local_ttl(&self) -> Duration {
        Duration::from_secs(self.local_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl RetrievalConfig {
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding_timeout_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_millis(self.completion_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            read_url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            api_base: None,
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            max_expand_depth: default_max_expand_depth(),
            max_path_depth: default_max_path_depth(),
            max_ancestor_depth: default_max_ancestor_depth(),
            max_result_nodes: default_max_result_nodes(),
            max_rows: default_max_rows(),
            derivation_edge_type: default_derivation_edge_type(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            local_ttl_secs: default_local_ttl(),
            shared_ttl_secs: default_shared_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            local_capacity: default_local_capacity(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            anchor_limit: default_anchor_limit(),
            similarity_threshold: default_similarity_threshold(),
            verified_only: false,
            depth: default_depth(),
            min_veracity: default_min_veracity(),
            max_nodes: default_max_nodes(),
            token_budget: default_token_budget(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            system_prompt: None,
            embedding_timeout_ms: default_embedding_timeout_ms(),
            store_timeout_ms: default_store_timeout_ms(),
            completion_timeout_ms: default_completion_timeout_ms(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            traversal: TraversalConfig::default(),
            cache: CacheSettings::default(),
            retrieval: RetrievalConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}
