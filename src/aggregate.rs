//! Single-threaded accumulation downstream of a pipeline run
//!
//! Workers never touch shared collections. They send values over a channel
//! to one aggregator thread, which owns the accumulator for the whole run and
//! hands it back once every sender is gone.

use crossbeam_channel::{Sender, bounded};
use std::thread;
use tracing::debug;

use crate::pipeline::{PipelineError, RunSummary};

/// Run `produce` while one aggregator thread folds everything it sends
///
/// `produce` receives the only sender; it is dropped when `produce` returns,
/// which ends the aggregator. `capacity` bounds the channel between them.
/// The accumulator is returned only if the producing side succeeded.
///
/// # Errors
/// Returns the producer's error, `PipelineError::Spawn` if the aggregator
/// thread could not start, or `PipelineError::WorkerPanicked` if it panicked.
pub fn collect<T, R, F, P>(
    capacity: usize,
    init: R,
    mut fold: F,
    produce: P,
) -> Result<(RunSummary, R), PipelineError>
where
    T: Send,
    R: Send,
    F: FnMut(&mut R, T) + Send,
    P: FnOnce(Sender<T>) -> Result<RunSummary, PipelineError>,
{
    thread::scope(|scope| {
        let (tx, rx) = bounded(capacity);
        let aggregator = thread::Builder::new()
            .name("s3kit-aggregator".to_string())
            .spawn_scoped(scope, move || {
                let mut acc = init;
                let mut received = 0usize;
                for value in rx {
                    fold(&mut acc, value);
                    received += 1;
                }
                debug!(received, "Aggregator drained");
                acc
            })
            .map_err(PipelineError::Spawn)?;

        let produced = produce(tx);
        let acc = aggregator
            .join()
            .map_err(|_| PipelineError::WorkerPanicked)?;
        produced.map(|summary| (summary, acc))
    })
}
