//! s3kit - Batch operations and access-log scanning over S3-style object stores
//!
//! Every version under one or more `s3://bucket/prefix` roots is listed page
//! by page and handed to a pool of worker threads, which apply an operation
//! (tagging, object locks, reads) to the versions a selection policy picks.

use thiserror::Error;

pub mod access_log;
pub mod aggregate;
pub mod cli;
pub mod commands;
pub mod config;
pub mod location;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod selection;
pub mod store;

#[cfg(test)]
pub mod testing;

pub use location::RootLocation;
pub use model::{Batch, Item, Tag};
pub use pipeline::{Operation, Pipeline, PipelineError, RunSummary};
pub use selection::SelectionPolicy;

/// Error enum, contains all failure states of the program
#[derive(Debug, Error)]
pub enum S3kitError {
    /// Malformed root location
    #[error("{0}")]
    Location(#[from] location::LocationError),
    /// Version selection flags could not be resolved
    #[error("{0}")]
    Selection(#[from] selection::SelectionError),
    /// A pipeline run failed
    #[error("{0}")]
    Pipeline(#[from] PipelineError),
    /// A store call outside a pipeline failed
    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),
    /// Represents a configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::SettingsError),
    /// Represents an I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON output could not be written
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<::config::ConfigError> for S3kitError {
    fn from(e: ::config::ConfigError) -> Self {
        Self::Config(config::SettingsError::Config(e))
    }
}
