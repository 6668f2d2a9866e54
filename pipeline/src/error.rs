//! Top-level error type for the pipeline binary.
//!
//! One `thiserror` enum for the whole process, with each variant wrapping
//! the underlying library error it came from.

use lib_common::configs::ConfigError;
use lib_common::db::{DbError, repository::RepositoryError};
use lib_common::retrieve::RestError;
use thiserror::Error;

/// Errors that can terminate the pipeline or a single collection cycle.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Startup configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The database was unreachable at startup or during a cycle.
    #[error("database unavailable: {0}")]
    StoreUnavailable(#[from] DbError),

    /// A vendor request exhausted its retry budget.
    #[error("transport error: {0}")]
    Transport(#[from] RestError),

    /// A batch write to the repository failed.
    #[error("write error: {0}")]
    Write(#[from] RepositoryError),
}
