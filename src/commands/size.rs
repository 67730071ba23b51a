//! Size accounting - `size`
//!
//! Each path spec is measured by one worker of a small pool: the worker lists
//! the spec to the end, counting current objects and their bytes, and sends
//! the total to a single collector.

use byte_unit::{Byte, UnitType};
use crossbeam_channel::{Receiver, Sender, bounded};
use serde::Serialize;
use std::ops::ControlFlow;
use std::thread;
use tracing::debug;

use crate::aggregate;
use crate::location::RootLocation;
use crate::pipeline::{PipelineError, RunSummary};
use crate::store::Enumerator;
use crate::{S3kitError, output};

/// Specs buffered between the dispatcher and the workers
const SPEC_CAPACITY: usize = 100;

/// Object count and total bytes under one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizeSpec {
    pub path: String,
    pub count: u64,
    pub size: u64,
}

impl SizeSpec {
    /// Human readable size, or the raw byte count when `raw`
    #[must_use]
    pub fn display_size(&self, raw: bool) -> String {
        format_size(self.size, raw)
    }
}

#[must_use]
pub fn format_size(bytes: u64, raw: bool) -> String {
    if raw {
        bytes.to_string()
    } else {
        format!(
            "{:.1}",
            Byte::from_u64(bytes).get_appropriate_unit(UnitType::Decimal)
        )
    }
}

/// The paths to measure: each root, or with `group` each top-level prefix
/// one `/` below it
fn expand<S: Enumerator + ?Sized>(
    store: &S,
    roots: &[RootLocation],
    group: bool,
) -> Result<Vec<RootLocation>, PipelineError> {
    if !group {
        return Ok(roots.to_vec());
    }
    let mut specs = Vec::new();
    for root in roots {
        let prefixes = store
            .common_prefixes(root)
            .map_err(|source| PipelineError::Enumeration {
                root: root.to_string(),
                source,
            })?;
        debug!(%root, prefixes = prefixes.len(), "Grouping");
        specs.extend(
            prefixes
                .into_iter()
                .map(|prefix| RootLocation::new(root.container(), prefix)),
        );
    }
    Ok(specs)
}

fn measure_one<S: Enumerator + ?Sized>(store: &S, spec: &RootLocation) -> Result<SizeSpec, PipelineError> {
    let mut measured = SizeSpec {
        path: spec.to_string(),
        count: 0,
        size: 0,
    };
    store
        .list_versions(spec, &mut |items| {
            for item in items.iter().filter(|i| i.is_current) {
                measured.count += 1;
                measured.size += item.size;
            }
            ControlFlow::Continue(())
        })
        .map_err(|source| PipelineError::Enumeration {
            root: spec.to_string(),
            source,
        })?;
    Ok(measured)
}

fn size_worker<S: Enumerator + ?Sized>(
    store: &S,
    specs: &Receiver<(usize, RootLocation)>,
    sizes: &Sender<(usize, SizeSpec)>,
) -> Result<usize, PipelineError> {
    let mut measured = 0;
    for (index, spec) in specs {
        let size = measure_one(store, &spec)?;
        measured += 1;
        if sizes.send((index, size)).is_err() {
            break;
        }
    }
    Ok(measured)
}

/// Measure every root (or every top-level prefix of it when `group`)
///
/// Rows come back in the order the paths were given.
///
/// # Errors
/// Returns `PipelineError::Enumeration` if a listing fails, and the worker
/// pool errors of [`crate::pipeline::Pipeline::run_unfiltered`].
pub fn measure<S: Enumerator + ?Sized>(
    store: &S,
    roots: &[RootLocation],
    group: bool,
    workers: usize,
) -> Result<Vec<SizeSpec>, PipelineError> {
    if workers == 0 {
        return Err(PipelineError::InvalidWorkerCount);
    }
    let specs = expand(store, roots, group)?;

    let (_, mut rows) = aggregate::collect(
        SPEC_CAPACITY,
        Vec::with_capacity(specs.len()),
        |rows: &mut Vec<(usize, SizeSpec)>, row| rows.push(row),
        |sizes| {
            thread::scope(|scope| {
                let (spec_tx, spec_rx) = bounded(SPEC_CAPACITY);
                let mut handles = Vec::with_capacity(workers);
                for id in 0..workers {
                    let specs = spec_rx.clone();
                    let sizes = sizes.clone();
                    let handle = thread::Builder::new()
                        .name(format!("s3kit-size-{id}"))
                        .spawn_scoped(scope, move || size_worker(store, &specs, &sizes))
                        .map_err(PipelineError::Spawn)?;
                    handles.push(handle);
                }
                drop(spec_rx);
                drop(sizes);

                for spec in specs.iter().cloned().enumerate() {
                    if spec_tx.send(spec).is_err() {
                        break;
                    }
                }
                drop(spec_tx);

                let mut measured = 0;
                let mut failure = None;
                for handle in handles {
                    match handle.join() {
                        Ok(Ok(count)) => measured += count,
                        Ok(Err(e)) => {
                            failure.get_or_insert(e);
                        }
                        Err(_) => {
                            failure.get_or_insert(PipelineError::WorkerPanicked);
                        }
                    }
                }
                match failure {
                    Some(e) => Err(e),
                    None => Ok(RunSummary {
                        batches: measured,
                        items: measured,
                    }),
                }
            })
        },
    )?;

    rows.sort_by_key(|(index, _)| *index);
    Ok(rows.into_iter().map(|(_, row)| row).collect())
}

/// Execute `size`
///
/// # Errors
/// Returns an error if a listing fails or output cannot be written.
pub fn execute<S: Enumerator + ?Sized>(
    store: &S,
    roots: &[RootLocation],
    group: bool,
    workers: usize,
    json: bool,
    raw: bool,
) -> Result<(), S3kitError> {
    let rows = measure(store, roots, group, workers)?;
    if json {
        return output::print_json(&rows);
    }
    print!("{}", output::size_table(&rows, raw));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_page_size(2)
            .with_object("b", "logs/2019/a", "v1", vec![0; 100])
            .with_object("b", "logs/2019/a", "v2", vec![0; 150])
            .with_object("b", "logs/2020/b", "v1", vec![0; 1000])
            .with_object("b", "logs/2020/c", "v1", vec![0; 1000])
            .with_object("b", "logs/top", "v1", vec![0; 7])
            .with_object("b", "data/x", "v1", vec![0; 5])
    }

    #[test]
    fn test_measures_current_objects_in_input_order() {
        let roots = vec![
            "s3://b/logs/".parse().unwrap(),
            "s3://b/data/".parse().unwrap(),
        ];
        let rows = measure(&store(), &roots, false, 3).unwrap();
        assert_eq!(
            rows,
            vec![
                SizeSpec {
                    path: "s3://b/logs/".into(),
                    count: 4,
                    size: 2157,
                },
                SizeSpec {
                    path: "s3://b/data/".into(),
                    count: 1,
                    size: 5,
                },
            ]
        );
    }

    #[test]
    fn test_group_by_top_level_prefix() {
        let roots = vec!["s3://b/logs/".parse().unwrap()];
        let rows = measure(&store(), &roots, true, 2).unwrap();
        let summary: Vec<_> = rows.iter().map(|r| (r.path.as_str(), r.count, r.size)).collect();
        assert_eq!(
            summary,
            vec![("s3://b/logs/2019/", 1, 150), ("s3://b/logs/2020/", 2, 2000)]
        );
    }

    #[test]
    fn test_many_specs_with_one_worker() {
        let store = (0..250).fold(MemoryStore::new(), |store, n| {
            store.with_object("b", &format!("p{n:03}/k"), "v1", vec![0; 2])
        });
        let rows = measure(&store, &["s3://b/".parse().unwrap()], true, 1).unwrap();
        assert_eq!(rows.len(), 250);
        assert_eq!(rows[249].path, "s3://b/p249/");
        assert!(rows.iter().all(|r| r.count == 1 && r.size == 2));
    }

    #[test]
    fn test_listing_failure() {
        let store = store().with_listing_failure("b", 0);
        let result = measure(&store, &["s3://b/logs/".parse().unwrap()], false, 2);
        assert!(matches!(result, Err(PipelineError::Enumeration { .. })));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(1_500_000, true), "1500000");
        assert_eq!(format_size(1_500_000, false), "1.5 MB");
    }
}
