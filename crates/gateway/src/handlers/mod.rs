//! API handlers module

pub mod cache;
pub mod graph;
pub mod health;
pub mod query;

use graphrag_common::errors::{AppError, Result};
use validator::Validate;

/// Run `validator` rules, reporting the first failing field
pub(crate) fn validate_request<T: Validate>(request: &T) -> Result<()> {
    request.validate().map_err(|e| AppError::Validation {
        field: e.field_errors().keys().next().map(|field| field.to_string()),
        message: e.to_string(),
    })
}
