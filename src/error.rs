//! Internal error type.
//!
//! Nothing in the public event path returns these. They exist so the fail-safe
//! branches have something concrete to log before degrading.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryLogError {
    #[error("failed to serialize parameter: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("query sink panicked: {0}")]
    SinkPanicked(String),
}
