//! Pipeline run errors

use thiserror::Error;

use super::BoxError;
use crate::store::EnumerateError;

/// Errors that end a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Listing a root location failed; no further roots were listed
    #[error("Can't list objects at {root}: {source}")]
    Enumeration {
        root: String,
        #[source]
        source: EnumerateError,
    },

    /// The operation failed on one item; the failing worker stopped there
    #[error("Can't process s3://{container}/{key}@{version}: {source}")]
    Operation {
        container: String,
        key: String,
        version: String,
        #[source]
        source: BoxError,
    },

    #[error("Worker count must be at least 1")]
    InvalidWorkerCount,

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Worker thread panicked")]
    WorkerPanicked,
}
