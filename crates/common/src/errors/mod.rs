//! Error types for GraphRAG
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error kinds for each failure mode of the retrieval pipeline
//! - Stage tagging for orchestrator failures
//! - HTTP status code mapping
//! - Structured error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Retrieval pipeline stage, used to tag orchestrator failures
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    CacheLookup,
    EmbedQuery,
    LocateAnchors,
    Traverse,
    AssembleContext,
    GenerateResponse,
    ExtractCitations,
    Done,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::CacheLookup => "cache_lookup",
            PipelineStage::EmbedQuery => "embed_query",
            PipelineStage::LocateAnchors => "locate_anchors",
            PipelineStage::Traverse => "traverse",
            PipelineStage::AssembleContext => "assemble_context",
            PipelineStage::GenerateResponse => "generate_response",
            PipelineStage::ExtractCitations => "extract_citations",
            PipelineStage::Done => "done",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    BoundsExceeded,

    // Resource errors (4xxx)
    NotFound,

    // External service errors (8xxx)
    EmbeddingUnavailable,
    CompletionUnavailable,
    StoreUnavailable,
    MalformedModelOutput,
    Timeout,
    CacheError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::BoundsExceeded => 1002,

            ErrorCode::NotFound => 4001,

            ErrorCode::EmbeddingUnavailable => 8001,
            ErrorCode::CompletionUnavailable => 8002,
            ErrorCode::StoreUnavailable => 8003,
            ErrorCode::MalformedModelOutput => 8004,
            ErrorCode::Timeout => 8005,
            ErrorCode::CacheError => 8006,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Requested {parameter} of {requested} exceeds hard ceiling of {ceiling}")]
    BoundsExceeded {
        parameter: String,
        requested: usize,
        ceiling: usize,
    },

    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Embedding service unavailable: {message}")]
    EmbeddingUnavailable { message: String },

    #[error("Completion service unavailable: {message}")]
    CompletionUnavailable { message: String },

    #[error("Graph store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Malformed model output: {message}")]
    MalformedModelOutput { message: String },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Stage {stage} failed: {source}")]
    Pipeline {
        stage: PipelineStage,
        #[source]
        source: Box<AppError>,
    },

    #[error("Cache error: {message}")]
    CacheError { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Node lookup miss
    pub fn node_not_found(id: impl Into<String>) -> Self {
        AppError::NotFound {
            resource_type: "node".to_string(),
            id: id.into(),
        }
    }

    /// Wrap this error with the pipeline stage it occurred in.
    /// Already-tagged errors keep their original stage.
    pub fn at_stage(self, stage: PipelineStage) -> Self {
        match self {
            tagged @ AppError::Pipeline { .. } => tagged,
            other => AppError::Pipeline {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage that produced this error, if tagged
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            AppError::Pipeline { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Innermost error, looking through stage tags
    pub fn root(&self) -> &AppError {
        match self {
            AppError::Pipeline { source, .. } => source.root(),
            other => other,
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::BoundsExceeded { .. } => ErrorCode::BoundsExceeded,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::EmbeddingUnavailable { .. } => ErrorCode::EmbeddingUnavailable,
            AppError::CompletionUnavailable { .. } => ErrorCode::CompletionUnavailable,
            AppError::StoreUnavailable { .. } => ErrorCode::StoreUnavailable,
            AppError::MalformedModelOutput { .. } => ErrorCode::MalformedModelOutput,
            AppError::Timeout { .. } => ErrorCode::Timeout,
            AppError::Pipeline { source, .. } => source.code(),
            AppError::CacheError { .. } => ErrorCode::CacheError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,

            // 404 Not Found
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,

            // 422 Unprocessable Entity
            AppError::BoundsExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,

            // 502 Bad Gateway
            AppError::EmbeddingUnavailable { .. }
            | AppError::CompletionUnavailable { .. }
            | AppError::MalformedModelOutput { .. } => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::StoreUnavailable { .. } | AppError::CacheError { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            // 504 Gateway Timeout
            AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,

            AppError::Pipeline { source, .. } => source.status_code(),

            // 500 Internal Server Error
            AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<PipelineStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let stage = self.stage();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                stage = ?stage,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let details = match self.root() {
            AppError::BoundsExceeded {
                parameter,
                requested,
                ceiling,
            } => Some(serde_json::json!({
                "parameter": parameter,
                "requested": requested,
                "ceiling": ceiling,
            })),
            AppError::Validation {
                field: Some(field), ..
            } => Some(serde_json::json!({ "field": field })),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                stage,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::CacheError {
            message: err.to_string(),
        }
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::StoreUnavailable {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}
