//! Access log line grammar
//!
//! One line holds these space separated fields, with the time in brackets
//! and three fields in double quotes:
//!
//! ```text
//! BucketOwner Bucket [Time] RemoteIP Requester RequestID Operation Key "RequestURI"
//! HTTPStatus ErrorCode BytesSent ObjectSize TotalTime TurnaroundTime "Referer"
//! "UserAgent" VersionId HostId SignatureVersion CipherSuite AuthenticationType
//! HostHeader TLSVersion
//! ```
//!
//! Newer log formats append fields after `TLSVersion`; the grammar is anchored
//! at the start of the line only, so those are ignored. A line that does not
//! carry every field above is skipped.

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use std::io::{self, BufRead, BufReader, Read};
use std::num::ParseIntError;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

use super::{AccessLogRecord, FullAccessLogRecord, LogRecord};

/// `10/Apr/2020:22:03:06 +0000`
const TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// Placeholder for an absent value
const ABSENT: &str = "-";

static LINE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?P<owner>\S+)\s+(?P<bucket>\S+)\s+\[(?P<time>[^\]]+)\]\s+",
        r"(?P<remote_ip>\S+)\s+(?P<requester>\S+)\s+(?P<request_id>\S+)\s+",
        r"(?P<operation>\S+)\s+(?P<key>\S+)\s+",
        r#""(?P<request_uri>[^"]*)"\s+"#,
        r"(?P<http_status>\S+)\s+(?P<error_code>\S+)\s+(?P<bytes_sent>\S+)\s+",
        r"(?P<object_size>\S+)\s+(?P<total_time>\S+)\s+(?P<turnaround_time>\S+)\s+",
        r#""(?P<referer>[^"]*)"\s+"(?P<user_agent>[^"]*)"\s+"#,
        r"(?P<version_id>\S+)\s+(?P<host_id>\S+)\s+(?P<signature_version>\S+)\s+",
        r"(?P<cipher_suite>\S+)\s+(?P<auth_type>\S+)\s+(?P<host_header>\S+)\s+",
        r"(?P<tls_version>\S+)",
    ))
    .expect("Invalid access log regex")
});

/// Why a single line was skipped
#[derive(Debug, Error)]
pub enum LineError {
    #[error("Line does not match the access log grammar")]
    Grammar,

    #[error("Invalid time '{value}': {source}")]
    Time {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Invalid {field} '{value}': {source}")]
    Number {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
}

/// Line counts of one parsed source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseSummary {
    /// Records handed to the visitor
    pub parsed: usize,
    /// Non-blank lines that failed to parse
    pub skipped: usize,
    /// Whether the visitor asked to stop before the end of the source
    pub stopped: bool,
}

/// Text of a named group; every group is mandatory once the line matched
pub(super) fn field<'t>(captures: &Captures<'t>, name: &str) -> &'t str {
    captures.name(name).map_or("", |m| m.as_str())
}

fn number<T>(captures: &Captures<'_>, name: &'static str) -> Result<T, LineError>
where
    T: FromStr<Err = ParseIntError> + Default,
{
    let value = field(captures, name);
    if value == ABSENT {
        return Ok(T::default());
    }
    value.parse().map_err(|source| LineError::Number {
        field: name,
        value: value.to_string(),
        source,
    })
}

fn millis(captures: &Captures<'_>, name: &'static str) -> Result<Duration, LineError> {
    number(captures, name).map(Duration::from_millis)
}

pub(super) fn request_fields(captures: &Captures<'_>) -> Result<AccessLogRecord, LineError> {
    let time = field(captures, "time");
    let time = DateTime::parse_from_str(time, TIME_FORMAT)
        .map_err(|source| LineError::Time {
            value: time.to_string(),
            source,
        })?
        .with_timezone(&Utc);

    Ok(AccessLogRecord {
        time,
        remote_ip: field(captures, "remote_ip").parse().ok(),
        operation: field(captures, "operation").to_string(),
        key: field(captures, "key").to_string(),
        request_uri: field(captures, "request_uri").to_string(),
        http_status: number(captures, "http_status")?,
        bytes_sent: number(captures, "bytes_sent")?,
        object_size: number(captures, "object_size")?,
        flight_time: millis(captures, "total_time")?,
        turnaround_time: millis(captures, "turnaround_time")?,
        referer: field(captures, "referer").to_string(),
        user_agent: field(captures, "user_agent").to_string(),
    })
}

/// Parse one line into a record
///
/// # Errors
/// Returns `LineError` if the line does not match the grammar or a typed
/// field does not convert.
pub fn parse_line<T: LogRecord>(line: &str) -> Result<T, LineError> {
    let captures = LINE_REGEX.captures(line).ok_or(LineError::Grammar)?;
    T::from_captures(&captures)
}

/// Parse every line of `source`, handing each record to `visitor`
///
/// Malformed lines are skipped. Parsing stops early when `visitor` returns
/// `false`.
///
/// # Errors
/// Returns an I/O error only if reading `source` fails.
pub fn parse_records<T, R, V>(source: R, mut visitor: V) -> io::Result<ParseSummary>
where
    T: LogRecord,
    R: Read,
    V: FnMut(T) -> bool,
{
    let mut reader = BufReader::new(source);
    let mut buf = Vec::new();
    let mut summary = ParseSummary::default();
    let mut line_no = 0usize;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_no += 1;
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            continue;
        }

        match parse_line::<T>(line) {
            Ok(record) => {
                summary.parsed += 1;
                if !visitor(record) {
                    summary.stopped = true;
                    break;
                }
            }
            Err(e) => {
                trace!(line = line_no, "Skipping line: {e}");
                summary.skipped += 1;
            }
        }
    }
    Ok(summary)
}

/// [`parse_records`] for request-level records
///
/// # Errors
/// Returns an I/O error only if reading `source` fails.
pub fn parse_lines<R: Read>(
    source: R,
    visitor: impl FnMut(AccessLogRecord) -> bool,
) -> io::Result<ParseSummary> {
    parse_records(source, visitor)
}

/// [`parse_records`] for full records
///
/// # Errors
/// Returns an I/O error only if reading `source` fails.
pub fn parse_lines_full<R: Read>(
    source: R,
    visitor: impl FnMut(FullAccessLogRecord) -> bool,
) -> io::Result<ParseSummary> {
    parse_records(source, visitor)
}
