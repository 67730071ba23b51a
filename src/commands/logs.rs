//! `logs` - print stored access logs as JSON lines

use serde::Serialize;
use std::io::{self, BufWriter, Write};
use std::ops::ControlFlow;
use tracing::{info, warn};

use crate::access_log::scan::ScanSummary;
use crate::access_log::{AccessLogRecord, FullAccessLogRecord, LogRecord, LogWindow, scan_logs};
use crate::location::RootLocation;
use crate::store::{Enumerator, ObjectReader};
use crate::{S3kitError, output};

/// Write every record inside `window` to `out`, one JSON object per line
///
/// The scan stops at the first write error, which is then returned.
///
/// # Errors
/// Returns the pipeline error of the scan or the first write error.
pub fn write_records<S, T, W>(
    store: &S,
    roots: &[RootLocation],
    window: &LogWindow,
    workers: usize,
    out: &mut W,
) -> Result<ScanSummary, S3kitError>
where
    S: Enumerator + ObjectReader + ?Sized,
    T: LogRecord + Serialize,
    W: Write + Send,
{
    let mut failure = None;
    let summary = scan_logs(store, roots, window, workers, |record: T| {
        match output::write_json_line(&mut *out, &record) {
            Ok(()) => ControlFlow::Continue(()),
            Err(e) => {
                failure = Some(e);
                ControlFlow::Break(())
            }
        }
    })?;
    if let Some(e) = failure {
        return Err(e);
    }
    out.flush()?;
    Ok(summary)
}

/// Execute `logs`
///
/// # Errors
/// Returns an error if listing fails or stdout cannot be written.
pub fn execute<S>(
    store: &S,
    roots: &[RootLocation],
    window: &LogWindow,
    workers: usize,
    full: bool,
) -> Result<(), S3kitError>
where
    S: Enumerator + ObjectReader + ?Sized,
{
    let mut out = BufWriter::new(io::stdout());
    let summary = if full {
        write_records::<_, FullAccessLogRecord, _>(store, roots, window, workers, &mut out)?
    } else {
        write_records::<_, AccessLogRecord, _>(store, roots, window, workers, &mut out)?
    };
    if summary.unreadable > 0 {
        warn!("{} log object(s) could not be read", summary.unreadable);
    }
    info!(
        "{} record(s) from {} log object(s)",
        summary.records, summary.objects
    );
    Ok(())
}
