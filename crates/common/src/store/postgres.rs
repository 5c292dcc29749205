//! Postgres-backed graph store
//!
//! Schema (owned by the ingestion side, read-only here):
//!
//! ```sql
//! CREATE TABLE kg_nodes (
//!     id         TEXT PRIMARY KEY,
//!     node_type  TEXT NOT NULL,
//!     properties JSONB NOT NULL DEFAULT '{}',
//!     veracity   REAL NOT NULL,
//!     verified   BOOLEAN NOT NULL DEFAULT FALSE,
//!     embedding  vector
//! );
//! CREATE TABLE kg_edges (
//!     id         TEXT PRIMARY KEY,
//!     edge_type  TEXT NOT NULL,
//!     source_id  TEXT NOT NULL REFERENCES kg_nodes (id),
//!     target_id  TEXT NOT NULL REFERENCES kg_nodes (id),
//!     properties JSONB NOT NULL DEFAULT '{}',
//!     veracity   REAL NOT NULL
//! );
//! ```

use super::{GraphStore, TraversalQuery, TraversalRow, VectorHit, VectorIndex};
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::graph::{clamp_unit, properties_from_json, Direction, Edge, Node, Path};
use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DbBackend, QueryResult, Statement, Value};
use tracing::{debug, instrument};

const EDGE_COLUMNS: &str = "e.id, e.edge_type, e.source_id, e.target_id, e.properties, e.veracity";

/// Recursive walk. Each branch carries its node path so it never re-enters a node
/// already on it. No ORDER BY: Postgres emits recursion levels in order, which lets
/// the LIMIT stop the recursion early.
const TRAVERSAL_SQL: &str = r#"
WITH RECURSIVE walk (
    seed_id, node_id, depth, node_path, edge_path, weight,
    id, edge_type, source_id, target_id, properties, veracity
) AS (
    SELECT n.id, n.id, 0, ARRAY[n.id], ARRAY[]::text[], 1.0::real,
           NULL::text, NULL::text, NULL::text, NULL::text, NULL::jsonb, NULL::real
    FROM kg_nodes n
    WHERE n.id = ANY($1)
  UNION ALL
    SELECT w.seed_id, step.next_id, w.depth + 1,
           w.node_path || step.next_id, w.edge_path || e.id,
           (w.weight * LEAST(GREATEST(e.veracity, 0), 1))::real,
           e.id, e.edge_type, e.source_id, e.target_id, e.properties, e.veracity
    FROM walk w
    JOIN kg_edges e
      ON ($4 <> 'incoming' AND e.source_id = w.node_id)
      OR ($4 <> 'outgoing' AND e.target_id = w.node_id)
    CROSS JOIN LATERAL (
        SELECT CASE
            WHEN $4 <> 'incoming' AND e.source_id = w.node_id THEN e.target_id
            ELSE e.source_id
        END AS next_id
    ) step
    WHERE w.depth < $2
      AND e.veracity >= $3
      AND ($5::text IS NULL OR e.edge_type = $5)
      AND NOT step.next_id = ANY(w.node_path)
)
SELECT seed_id, depth, node_path, edge_path, weight,
       id, edge_type, source_id, target_id, properties, veracity
FROM walk
WHERE depth > 0
LIMIT $6
"#;

fn store_error(context: &str, e: sea_orm::DbErr) -> AppError {
    AppError::StoreUnavailable {
        message: format!("{}: {}", context, e),
    }
}

fn ids_value(ids: &[String]) -> Value {
    ids.to_vec().into()
}

fn edge_from_row(row: &QueryResult) -> Result<Edge> {
    let properties: Option<serde_json::Value> = row
        .try_get("", "properties")
        .map_err(|e| store_error("edge properties", e))?;
    let veracity: f32 = row
        .try_get("", "veracity")
        .map_err(|e| store_error("edge veracity", e))?;

    Ok(Edge {
        id: row.try_get("", "id").map_err(|e| store_error("edge id", e))?,
        edge_type: row
            .try_get("", "edge_type")
            .map_err(|e| store_error("edge type", e))?,
        source_id: row
            .try_get("", "source_id")
            .map_err(|e| store_error("edge source", e))?,
        target_id: row
            .try_get("", "target_id")
            .map_err(|e| store_error("edge target", e))?,
        properties: properties.map(properties_from_json).unwrap_or_default(),
        veracity: clamp_unit(veracity),
    })
}

fn node_from_row(row: &QueryResult) -> Result<Node> {
    let properties: Option<serde_json::Value> = row
        .try_get("", "properties")
        .map_err(|e| store_error("node properties", e))?;
    let veracity: f32 = row
        .try_get("", "veracity")
        .map_err(|e| store_error("node veracity", e))?;

    Ok(Node {
        id: row.try_get("", "id").map_err(|e| store_error("node id", e))?,
        node_type: row
            .try_get("", "node_type")
            .map_err(|e| store_error("node type", e))?,
        properties: properties.map(properties_from_json).unwrap_or_default(),
        veracity: clamp_unit(veracity),
        verified: row.try_get("", "verified").unwrap_or(false),
        embedding: None,
        distance: None,
    })
}

/// Graph queries over `kg_nodes` / `kg_edges`
#[derive(Clone)]
pub struct PgGraphStore {
    db: DbPool,
}

impl PgGraphStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl GraphStore for PgGraphStore {
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn get_nodes(&self, ids: &[String]) -> Result<Vec<Node>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self
            .db
            .read()
            .query_all(Statement::from_sql_and_values(
                DbBackend::Postgres,
                "SELECT id, node_type, properties, veracity, verified FROM kg_nodes WHERE id = ANY($1)",
                vec![ids_value(ids)],
            ))
            .await
            .map_err(|e| store_error("Failed to load nodes", e))?;

        rows.iter().map(node_from_row).collect()
    }

    #[instrument(skip(self, ids), fields(count = ids.len(), %direction))]
    async fn neighbors(
        &self,
        ids: &[String],
        direction: Direction,
        min_veracity: f32,
        edge_type: Option<&str>,
    ) -> Result<Vec<Edge>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT {EDGE_COLUMNS}
            FROM kg_edges e
            WHERE e.veracity >= $2
              AND (($3 <> 'incoming' AND e.source_id = ANY($1))
                OR ($3 <> 'outgoing' AND e.target_id = ANY($1)))
              AND ($4::text IS NULL OR e.edge_type = $4)
            ORDER BY e.id
            "#
        );

        let rows = self
            .db
            .read()
            .query_all(Statement::from_sql_and_values(
                DbBackend::Postgres,
                &sql,
                vec![
                    ids_value(ids),
                    min_veracity.into(),
                    direction.as_str().into(),
                    edge_type.map(str::to_string).into(),
                ],
            ))
            .await
            .map_err(|e| store_error("Failed to load neighbors", e))?;

        rows.iter().map(edge_from_row).collect()
    }

    #[instrument(skip(self, query), fields(seeds = query.seed_ids.len(), depth = query.max_depth))]
    async fn bounded_traversal(&self, query: &TraversalQuery) -> Result<Vec<TraversalRow>> {
        if query.seed_ids.is_empty() || query.max_depth == 0 || query.max_rows == 0 {
            return Ok(Vec::new());
        }

        let rows = self
            .db
            .read()
            .query_all(Statement::from_sql_and_values(
                DbBackend::Postgres,
                TRAVERSAL_SQL,
                vec![
                    ids_value(&query.seed_ids),
                    (query.max_depth as i32).into(),
                    query.min_veracity.into(),
                    query.direction.as_str().into(),
                    query.edge_type.clone().into(),
                    (query.max_rows as i64).into(),
                ],
            ))
            .await
            .map_err(|e| store_error("Traversal query failed", e))?;

        let mut result = Vec::with_capacity(rows.len());
        for row in &rows {
            let weight: f32 = row
                .try_get("", "weight")
                .map_err(|e| store_error("path weight", e))?;
            result.push(TraversalRow {
                seed_id: row
                    .try_get("", "seed_id")
                    .map_err(|e| store_error("seed id", e))?,
                edge: edge_from_row(row)?,
                path: Path {
                    nodes: row
                        .try_get("", "node_path")
                        .map_err(|e| store_error("node path", e))?,
                    edges: row
                        .try_get("", "edge_path")
                        .map_err(|e| store_error("edge path", e))?,
                    weight: clamp_unit(weight),
                },
            });
        }

        // Level order is what Postgres produces; make it a guarantee
        result.sort_by_key(TraversalRow::depth);

        debug!(rows = result.len(), "Bounded traversal complete");
        Ok(result)
    }

    async fn derived_from(&self, node_id: &str, edge_type: &str) -> Result<Option<Edge>> {
        let sql = format!(
            r#"
            SELECT {EDGE_COLUMNS}
            FROM kg_edges e
            WHERE e.source_id = $1 AND e.edge_type = $2
            ORDER BY e.veracity DESC, e.id
            LIMIT 1
            "#
        );

        let row = self
            .db
            .read()
            .query_one(Statement::from_sql_and_values(
                DbBackend::Postgres,
                &sql,
                vec![node_id.into(), edge_type.into()],
            ))
            .await
            .map_err(|e| store_error("Failed to load derivation edge", e))?;

        row.as_ref().map(edge_from_row).transpose()
    }
}

/// pgvector nearest-neighbour search over `kg_nodes.embedding`
#[derive(Clone)]
pub struct PgVectorIndex {
    db: DbPool,
}

impl PgVectorIndex {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

/// pgvector text literal, e.g. `[0.1,0.2]`
fn vector_literal(embedding: &[f32]) -> String {
    let parts: Vec<String> = embedding.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    #[instrument(skip(self, embedding), fields(dim = embedding.len()))]
    async fn nearest(
        &self,
        embedding: &[f32],
        min_similarity: f32,
        limit: usize,
        verified_only: bool,
    ) -> Result<Vec<VectorHit>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let sql = r#"
            SELECT id, (1 - (embedding <=> $1::vector))::real AS similarity
            FROM kg_nodes
            WHERE embedding IS NOT NULL
              AND ($4 = FALSE OR verified)
              AND 1 - (embedding <=> $1::vector) >= $2
            ORDER BY embedding <=> $1::vector, id
            LIMIT $3
        "#;

        let rows = self
            .db
            .read()
            .query_all(Statement::from_sql_and_values(
                DbBackend::Postgres,
                sql,
                vec![
                    vector_literal(embedding).into(),
                    (min_similarity as f64).into(),
                    (limit as i64).into(),
                    verified_only.into(),
                ],
            ))
            .await
            .map_err(|e| store_error("Vector search failed", e))?;

        rows.iter()
            .map(|row| {
                Ok(VectorHit {
                    node_id: row.try_get("", "id").map_err(|e| store_error("hit id", e))?,
                    similarity: row
                        .try_get("", "similarity")
                        .map_err(|e| store_error("hit similarity", e))?,
                })
            })
            .collect()
    }
}
