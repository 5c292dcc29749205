//! GraphRAG API Gateway
//!
//! The HTTP entry point of the retrieval engine.
//! Handles:
//! - Query answering over the knowledge graph
//! - Direct traversal operations (expand, paths, ancestors, neighbors)
//! - Cache invalidation after upstream graph mutations
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;

use axum::{
    routing::{get, post},
    Router,
};
use graphrag_common::{
    cache::{RedisCache, SharedCache},
    config::AppConfig,
    db::DbPool,
    embeddings::create_embedder,
    errors::Result,
    llm::create_completer,
    metrics::{self, LATENCY_BUCKETS},
    store::{PgGraphStore, PgVectorIndex},
    GraphStore, VectorIndex,
};
use graphrag_context::{ResultCache, RetrievalOrchestrator};
use graphrag_traversal::{AnchorLocator, GraphTraversalEngine};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Unset when the gateway runs over in-process collaborators
    pub db: Option<DbPool>,
    pub orchestrator: Arc<RetrievalOrchestrator>,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    // Initialize tracing
    init_tracing(&config);

    info!("Starting GraphRAG API Gateway v{}", graphrag_common::VERSION);

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .set_buckets(LATENCY_BUCKETS)?
            .with_http_listener(addr)
            .install()?;
        info!("Metrics exporter listening on {}", addr);
    }
    metrics::register_metrics();

    // Initialize database connection
    info!("Connecting to graph store...");
    let db = DbPool::new(&config.database).await?;
    let graph: Arc<dyn GraphStore> = Arc::new(PgGraphStore::new(db.clone()));
    let index: Arc<dyn VectorIndex> = Arc::new(PgVectorIndex::new(db.clone()));

    let shared = connect_shared_cache(&config).await;
    let orchestrator = build_orchestrator(&config, graph, index, shared)?;
    let sweeper = orchestrator.cache().spawn_sweeper();

    // Create app state
    let state = AppState {
        config: config.clone(),
        db: Some(db),
        orchestrator,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.observability.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Connect the shared cache tier. A Redis outage at startup degrades to local-only caching.
async fn connect_shared_cache(config: &AppConfig) -> Option<Arc<dyn SharedCache>> {
    if !config.cache.enabled {
        return None;
    }
    let url = config.redis.url.as_deref()?;

    match RedisCache::new(url, config.cache.key_prefix.clone()).await {
        Ok(cache) => {
            info!("Shared cache tier connected");
            Some(Arc::new(cache))
        }
        Err(e) => {
            warn!(error = %e, "Shared cache tier unavailable, continuing with local cache only");
            None
        }
    }
}

/// Wire the retrieval pipeline over the given stores
pub fn build_orchestrator(
    config: &AppConfig,
    graph: Arc<dyn GraphStore>,
    index: Arc<dyn VectorIndex>,
    shared: Option<Arc<dyn SharedCache>>,
) -> Result<Arc<RetrievalOrchestrator>> {
    let embedder = create_embedder(&config.embedding)?;
    let completer = create_completer(&config.llm)?;

    let locator = AnchorLocator::new(embedder, index, graph.clone());
    let engine = Arc::new(GraphTraversalEngine::new(graph, config.traversal.clone()));
    let cache = Arc::new(ResultCache::new(config.cache.clone(), shared));

    Ok(Arc::new(RetrievalOrchestrator::new(
        locator,
        engine,
        completer,
        cache,
        config.retrieval.clone(),
    )))
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let api_routes = Router::new()
        // Retrieval endpoints
        .route("/query", post(handlers::query::query))
        .route("/anchors", post(handlers::query::anchors))

        // Traversal endpoints
        .route("/graph/expand", post(handlers::graph::expand))
        .route("/graph/edge-type", post(handlers::graph::edge_type))
        .route("/graph/path", post(handlers::graph::path))
        .route("/graph/nodes/{id}/ancestors", get(handlers::graph::ancestors))
        .route("/graph/nodes/{id}/neighbors", get(handlers::graph::neighbors))
        .route("/graph/nodes/{id}/stats", get(handlers::graph::stats))

        // Cache endpoints
        .route("/cache/invalidate", post(handlers::cache::invalidate))
        .route_layer(axum::middleware::from_fn(middleware::metrics::track_metrics));

    // Compose the app
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/v1", api_routes)
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
