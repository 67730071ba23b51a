//! Worker side of the pipeline

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, trace};

use super::{Operation, PipelineError};
use crate::model::Batch;

/// What one worker got through before the batch channel closed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct WorkerStats {
    pub(crate) batches: usize,
    pub(crate) items: usize,
}

impl WorkerStats {
    pub(crate) const fn merge(&mut self, other: Self) {
        self.batches += other.batches;
        self.items += other.items;
    }
}

/// Receive batches until the channel closes or an item fails
///
/// On failure the worker signals `failures` once and returns without
/// taking another batch.
pub(crate) fn worker_loop<O: Operation + ?Sized>(
    id: usize,
    batches: &Receiver<Batch>,
    operation: &O,
    failures: &Sender<()>,
) -> Result<WorkerStats, PipelineError> {
    let mut stats = WorkerStats::default();
    for batch in batches {
        debug!(worker = id, container = %batch.container, items = batch.len(), "Received batch");
        if let Err(e) = process_batch(&batch, operation) {
            debug!(worker = id, "Stopping: {e}");
            // Capacity is one; a full channel already carries the signal.
            let _ = failures.try_send(());
            return Err(e);
        }
        stats.batches += 1;
        stats.items += batch.len();
    }
    debug!(worker = id, batches = stats.batches, "Channel closed");
    Ok(stats)
}

fn process_batch<O: Operation + ?Sized>(batch: &Batch, operation: &O) -> Result<(), PipelineError> {
    for item in &batch.items {
        trace!(key = %item.key, version = %item.version_id, "Applying");
        operation
            .apply(&batch.container, item)
            .map_err(|source| PipelineError::Operation {
                container: batch.container.clone(),
                key: item.key.clone(),
                version: item.version_id.clone(),
                source,
            })?;
    }
    Ok(())
}
