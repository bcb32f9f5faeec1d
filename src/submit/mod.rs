// src/submit/mod.rs
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::rules::CandidateRow;

pub mod http;

pub use http::HttpSubmitter;

/// Why the remote system did not accept a row.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// Business rule, e.g. duplicate enrollment or unknown section.
    #[error("{0}")]
    Rejected(String),
    /// Network, timeout or server-side failure.
    #[error("{0}")]
    Transient(String),
}

/// Result of submitting one row. Written exactly once per submitted row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum RowOutcome {
    Succeeded,
    Failed(String),
}

/// The remote operation behind one import screen. One call per row.
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, row: &CandidateRow) -> Result<(), SubmitError>;
}
