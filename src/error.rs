//! Error types for bugroute.
//!
//! Oracle-side failures never appear here: they are absorbed by the stress
//! predictor and surface only as a prediction source tag.

use crate::model::WorkItemId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// The metrics store could not be reached while loading candidates or
    /// metrics. Fatal to the current request and not retried here.
    #[error("metrics store unavailable: {0}")]
    DependencyUnavailable(String),

    /// The atomic commit did not complete. Nothing was persisted; the work
    /// item is still unassigned.
    #[error("assignment of work item {item} failed: {reason}")]
    AssignmentFailed { item: WorkItemId, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap a store-side failure observed on a read path.
    pub(crate) fn unavailable(err: Error) -> Self {
        match err {
            Error::DependencyUnavailable(_) => err,
            other => Error::DependencyUnavailable(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
