//! Server access log records
//!
//! Two record shapes come out of the same line grammar: [`AccessLogRecord`]
//! carries the request-level fields most queries need, and
//! [`FullAccessLogRecord`] adds every remaining field of the line.

use chrono::{DateTime, Utc};
use regex::Captures;
use serde::{Serialize, Serializer};
use std::net::IpAddr;
use std::time::Duration;

mod parser;
pub mod scan;

pub use parser::{LineError, ParseSummary, parse_line, parse_lines, parse_lines_full, parse_records};
pub use scan::{LogWindow, scan_logs};

/// Request-level view of one access log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessLogRecord {
    pub time: DateTime<Utc>,
    /// `None` when the address field is `-` or not an address
    pub remote_ip: Option<IpAddr>,
    pub operation: String,
    pub key: String,
    pub request_uri: String,
    pub http_status: u16,
    pub bytes_sent: u64,
    pub object_size: u64,
    /// Total time, serialized in milliseconds
    #[serde(serialize_with = "as_millis")]
    pub flight_time: Duration,
    #[serde(serialize_with = "as_millis")]
    pub turnaround_time: Duration,
    pub referer: String,
    pub user_agent: String,
}

/// Every field of one access log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FullAccessLogRecord {
    pub owner: String,
    pub bucket: String,
    pub requester: String,
    pub request_id: String,
    #[serde(flatten)]
    pub request: AccessLogRecord,
    pub error_code: String,
    pub version_id: String,
    pub host_id: String,
    pub signature_version: String,
    pub cipher_suite: String,
    pub auth_type: String,
    pub host_header: String,
    pub tls_version: String,
}

/// A record type the line grammar can produce
pub trait LogRecord: Sized + Send {
    /// Build a record from one matched line
    ///
    /// # Errors
    /// Returns `LineError` when a typed field does not convert.
    fn from_captures(captures: &Captures<'_>) -> Result<Self, LineError>;

    /// When the request was received
    fn time(&self) -> DateTime<Utc>;
}

impl LogRecord for AccessLogRecord {
    fn from_captures(captures: &Captures<'_>) -> Result<Self, LineError> {
        parser::request_fields(captures)
    }

    fn time(&self) -> DateTime<Utc> {
        self.time
    }
}

impl LogRecord for FullAccessLogRecord {
    fn from_captures(captures: &Captures<'_>) -> Result<Self, LineError> {
        let text = |name: &str| parser::field(captures, name).to_string();
        Ok(Self {
            request: parser::request_fields(captures)?,
            owner: text("owner"),
            bucket: text("bucket"),
            requester: text("requester"),
            request_id: text("request_id"),
            error_code: text("error_code"),
            version_id: text("version_id"),
            host_id: text("host_id"),
            signature_version: text("signature_version"),
            cipher_suite: text("cipher_suite"),
            auth_type: text("auth_type"),
            host_header: text("host_header"),
            tls_version: text("tls_version"),
        })
    }

    fn time(&self) -> DateTime<Utc> {
        self.request.time
    }
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}
