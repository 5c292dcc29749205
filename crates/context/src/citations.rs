//! Citation extraction from model output

use crate::assembler::AugmentedContext;
use graphrag_common::errors::{AppError, Result};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const TOKEN_PREFIX: &str = "[Node-";

/// Citation token for the `index`-th context entry (1-based)
pub fn citation_token(index: usize) -> String {
    format!("{}{}]", TOKEN_PREFIX, index)
}

/// Citation found in the model's answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub token: String,
    pub node_id: String,
    /// Byte offset of the first occurrence in the answer
    pub position: usize,
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[Node-([^\]\[\s]*)\]").expect("valid citation pattern"))
}

/// Resolve every citation token in `answer` against the context, first occurrence
/// order, each node once.
///
/// Fails with `MalformedModelOutput` when a citation-shaped token does not parse or
/// names an entry the context never offered.
pub fn extract_citations(answer: &str, context: &AugmentedContext) -> Result<Vec<Citation>> {
    let mut citations: Vec<Citation> = Vec::new();
    let mut well_formed = 0;

    for cap in token_pattern().captures_iter(answer) {
        let (Some(whole), Some(index)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        well_formed += 1;

        let valid_index = index
            .as_str()
            .parse::<usize>()
            .ok()
            .filter(|i| *i > 0)
            .map(citation_token);
        let Some(node_id) = valid_index.as_deref().and_then(|t| context.resolve(t)) else {
            return Err(AppError::MalformedModelOutput {
                message: format!("unknown citation token {}", whole.as_str()),
            });
        };

        if !citations.iter().any(|c| c.node_id == node_id) {
            citations.push(Citation {
                token: whole.as_str().to_string(),
                node_id: node_id.to_string(),
                position: whole.start(),
            });
        }
    }

    // Anything starting like a token but not closing like one
    if answer.matches(TOKEN_PREFIX).count() > well_formed {
        return Err(AppError::MalformedModelOutput {
            message: "unterminated citation token".to_string(),
        });
    }

    Ok(citations)
}
