//! Scanning stored access log objects
//!
//! Every current object under the roots is read by a pipeline worker and
//! streamed through the line parser. Records inside the time window go to a
//! single sink thread over a bounded channel.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, warn};

use super::{LogRecord, parse_records};
use crate::aggregate;
use crate::location::RootLocation;
use crate::pipeline::{Pipeline, PipelineError, operation};
use crate::selection::SelectionPolicy;
use crate::store::{Enumerator, ObjectReader};

/// Records buffered between workers and the sink
pub const SINK_CAPACITY: usize = 100;

/// Open time interval; both ends are excluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Default for LogWindow {
    /// From the epoch to the start of tomorrow (UTC)
    fn default() -> Self {
        let today = Utc::now().date_naive();
        Self {
            start: DateTime::UNIX_EPOCH,
            end: midnight(today.succ_opt().unwrap_or(today)),
        }
    }
}

impl LogWindow {
    #[must_use]
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window between two dates at 00:00 UTC, defaulting missing ends
    #[must_use]
    pub fn from_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        let default = Self::default();
        Self {
            start: start.map_or(default.start, midnight),
            end: end.map_or(default.end, midnight),
        }
    }

    #[must_use]
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        time > self.start && time < self.end
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Counts of one scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Log objects read to the end
    pub objects: usize,
    /// Log objects that could not be opened or read
    pub unreadable: usize,
    /// Records forwarded to the sink
    pub records: usize,
    /// The sink asked to stop before every object was read
    pub stopped: bool,
}

/// Stream every record inside `window` from the current objects under `roots`
///
/// Objects that cannot be read are logged and skipped. `sink` runs on one
/// thread and sees records in no particular order across objects. Once it
/// returns `ControlFlow::Break`, it sees no more records, workers stop
/// parsing and no further objects are listed or opened.
///
/// # Errors
/// Returns `PipelineError` if listing fails or the worker pool cannot run.
pub fn scan_logs<S, T, V>(
    store: &S,
    roots: &[RootLocation],
    window: &LogWindow,
    workers: usize,
    mut sink: V,
) -> Result<ScanSummary, PipelineError>
where
    S: Enumerator + ObjectReader + ?Sized,
    T: LogRecord,
    V: FnMut(T) -> ControlFlow<()> + Send,
{
    let objects = AtomicUsize::new(0);
    let unreadable = AtomicUsize::new(0);
    let records = AtomicUsize::new(0);
    let stopped = AtomicBool::new(false);

    let scanned = aggregate::collect(
        SINK_CAPACITY,
        (),
        |_, record: T| {
            // Drain without forwarding once stopped
            if stopped.load(Ordering::Relaxed) {
                return;
            }
            records.fetch_add(1, Ordering::Relaxed);
            if sink(record).is_break() {
                stopped.store(true, Ordering::Relaxed);
            }
        },
        |tx| {
            let read_object = operation(|container, item| {
                if stopped.load(Ordering::Relaxed) {
                    return Err("log sink stopped".into());
                }
                let source = match store.open(container, &item.key) {
                    Ok(source) => source,
                    Err(e) => {
                        warn!("Error reading {}: {e}", item.url(container));
                        unreadable.fetch_add(1, Ordering::Relaxed);
                        return Ok(());
                    }
                };
                let parsed = parse_records(source, |record: T| {
                    !stopped.load(Ordering::Relaxed)
                        && (!window.contains(record.time()) || tx.send(record).is_ok())
                });
                match parsed {
                    Ok(summary) => {
                        debug!(
                            object = %item.url(container),
                            parsed = summary.parsed,
                            skipped = summary.skipped,
                            "Scanned"
                        );
                        objects.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        warn!("Error reading {}: {e}", item.url(container));
                        unreadable.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Ok(())
            });
            Pipeline::new(store)
                .with_workers(workers)
                .run(roots, &SelectionPolicy::CurrentOnly, read_object)
        },
    );

    let stopped = stopped.into_inner();
    match scanned {
        Ok(_) => {}
        Err(PipelineError::Operation { .. }) if stopped => debug!("Scan stopped by sink"),
        Err(e) => return Err(e),
    }
    Ok(ScanSummary {
        objects: objects.into_inner(),
        unreadable: unreadable.into_inner(),
        records: records.into_inner(),
        stopped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_log::{AccessLogRecord, FullAccessLogRecord};
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn line(day: u32, key: &str) -> String {
        format!(
            r#"owner logs [{day:02}/Apr/2020:12:00:00 +0000] 10.0.0.1 req id REST.GET.OBJECT {key} "GET /{key} HTTP/1.1" 200 - 10 10 1 1 "-" "agent" - host SigV4 - AuthHeader h TLSv1.2"#
        )
    }

    fn store() -> MemoryStore {
        let first = [line(1, "a"), line(5, "b"), "garbage".to_string()].join("\n");
        let second = [line(9, "c"), line(20, "d")].join("\n");
        MemoryStore::new()
            .with_page_size(1)
            .with_object("logs", "2020/first.log", "v1", first)
            .with_object("logs", "2020/second.log", "v1", second)
            .with_object("logs", "2020/old.log", "v1", line(2, "old"))
            .with_object("logs", "2020/old.log", "v2", line(3, "new"))
    }

    fn keys(window: LogWindow, workers: usize) -> (Vec<String>, ScanSummary) {
        let mut keys = Vec::new();
        let summary = scan_logs(
            &store(),
            &["s3://logs/2020/".parse().unwrap()],
            &window,
            workers,
            |r: AccessLogRecord| {
                keys.push(r.key);
                ControlFlow::Continue(())
            },
        )
        .unwrap();
        keys.sort();
        (keys, summary)
    }

    #[test]
    fn test_default_window_takes_everything() {
        let (keys, summary) = keys(LogWindow::default(), 3);
        assert_eq!(keys, vec!["a", "b", "c", "d", "new"]);
        assert_eq!(summary.objects, 3);
        assert_eq!(summary.records, 5);
    }

    #[test]
    fn test_window_bounds_are_exclusive() {
        let window = LogWindow::new(
            Utc.with_ymd_and_hms(2020, 4, 1, 12, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2020, 4, 9, 12, 0, 0).unwrap(),
        );
        let (keys, _) = keys(window, 2);
        assert_eq!(keys, vec!["b", "new"]);
    }

    #[test]
    fn test_unreadable_object_is_skipped() {
        let store = store().with_unreadable("logs", "2020/first.log");
        let mut records = Vec::new();
        let summary = scan_logs(
            &store,
            &["s3://logs/".parse().unwrap()],
            &LogWindow::default(),
            2,
            |r: FullAccessLogRecord| {
                records.push(r);
                ControlFlow::Continue(())
            },
        )
        .unwrap();
        assert_eq!(summary.unreadable, 1);
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.bucket == "logs"));
    }

    #[test]
    fn test_missing_bucket_fails() {
        let result = scan_logs(
            &store(),
            &["s3://nope/".parse().unwrap()],
            &LogWindow::default(),
            2,
            |_: AccessLogRecord| ControlFlow::Continue(()),
        );
        assert!(matches!(result, Err(PipelineError::Enumeration { .. })));
    }

    /// Counts opens and delays each one
    struct SlowStore {
        inner: MemoryStore,
        opens: AtomicUsize,
    }

    impl Enumerator for SlowStore {
        fn list_versions(
            &self,
            root: &RootLocation,
            visit: &mut dyn FnMut(Vec<crate::model::Item>) -> ControlFlow<()>,
        ) -> Result<(), crate::store::EnumerateError> {
            self.inner.list_versions(root, visit)
        }

        fn common_prefixes(
            &self,
            root: &RootLocation,
        ) -> Result<Vec<String>, crate::store::EnumerateError> {
            self.inner.common_prefixes(root)
        }
    }

    impl ObjectReader for SlowStore {
        fn open(
            &self,
            container: &str,
            key: &str,
        ) -> Result<Box<dyn std::io::Read + Send>, crate::store::StoreError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            self.inner.open(container, key)
        }
    }

    #[test]
    fn test_sink_break_stops_the_scan() {
        let inner = (0..50).fold(MemoryStore::new().with_page_size(1), |store, n| {
            store.with_object("logs", &format!("{n:03}.log"), "v1", line(1, &format!("k{n}")))
        });
        let store = SlowStore {
            inner,
            opens: AtomicUsize::new(0),
        };
        let mut seen = 0;
        let summary = scan_logs(
            &store,
            &["s3://logs/".parse().unwrap()],
            &LogWindow::default(),
            1,
            |_: AccessLogRecord| {
                seen += 1;
                ControlFlow::Break(())
            },
        )
        .unwrap();

        assert!(summary.stopped);
        assert_eq!(seen, 1);
        assert_eq!(summary.records, 1);
        assert!(store.opens.load(Ordering::SeqCst) < 50);
    }

    #[test]
    fn test_full_scan_is_not_stopped() {
        let (_, summary) = keys(LogWindow::default(), 2);
        assert!(!summary.stopped);
    }

    #[test]
    fn test_window_from_dates() {
        let window = LogWindow::from_dates(NaiveDate::from_ymd_opt(2020, 4, 2), None);
        assert_eq!(window.start, Utc.with_ymd_and_hms(2020, 4, 2, 0, 0, 0).unwrap());
        assert!(window.end > Utc::now());
        assert!(!window.contains(window.start));
    }
}
