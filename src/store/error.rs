//! Store-specific error types
//!
//! - **`EnumerateError`**: a listing page could not be fetched
//! - **`StoreError`**: any other store capability failed (object reads,
//!   tagging, object lock calls)

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Listing failures
#[derive(Debug, Error)]
pub enum EnumerateError {
    /// The container does not exist
    #[error("No such bucket: {0}")]
    NoSuchContainer(String),

    /// A page could not be fetched
    #[error("Failed to fetch listing page for {location}: {reason}")]
    PageFetch { location: String, reason: String },

    /// I/O error while walking a local store
    #[error("I/O error while listing: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of store capabilities other than listing
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No such bucket: {0}")]
    NoSuchContainer(String),

    #[error("No such object: s3://{container}/{key}")]
    NoSuchObject { container: String, key: String },

    /// A retention lock forbids the requested change
    #[error("Access denied: {path} is locked until {until}")]
    Locked { path: String, until: DateTime<Utc> },

    /// Object metadata could not be decoded or encoded
    #[error("Invalid object metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend failure
    #[error("{0}")]
    Backend(String),
}
