//! Concurrent batch-apply pipeline
//!
//! Architecture:
//! ```text
//! Dispatcher: list root 1 ─┬─ page → Batch ─┐
//!             list root 2 ─┘                │  rendezvous channel (capacity 0)
//!                                           ▼
//! ├── Worker 0: recv batch → apply op to each item in order
//! ├── Worker 1: recv batch → apply op to each item in order
//! └── Worker N: recv batch → apply op to each item in order
//!                                           │
//!                              join barrier ┴→ RunSummary | PipelineError
//! ```
//!
//! The dispatcher blocks on every send until a worker is free, so at most
//! one page per worker is held in memory. Dropping the sender after the last
//! root is the only termination signal the workers get.
//!
//! The first operation error is fatal to the run. The failing worker stops
//! at that item and reports it on a failure channel; the dispatcher stops
//! listing once it sees the report. Batches already running on other
//! workers are left to finish. The error comes back to the caller only after
//! every worker has been joined.

use std::thread;

use crossbeam_channel::bounded;
use tracing::debug;

use crate::location::RootLocation;
use crate::model::Item;
use crate::selection::SelectionPolicy;
use crate::store::Enumerator;

mod dispatcher;
mod error;
mod worker;

pub use error::PipelineError;

use dispatcher::{DispatchOutcome, Dispatcher};
use worker::{WorkerStats, worker_loop};

/// Error type returned by caller-supplied operations
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A side effect applied to one item of one container
///
/// Implemented for every `Fn(&str, &Item) -> Result<(), BoxError> + Sync`.
/// Operations are shared by reference across all workers of a run.
pub trait Operation: Sync {
    /// # Errors
    /// Any error is fatal to the pipeline run.
    fn apply(&self, container: &str, item: &Item) -> Result<(), BoxError>;
}

impl<F> Operation for F
where
    F: Fn(&str, &Item) -> Result<(), BoxError> + Sync,
{
    fn apply(&self, container: &str, item: &Item) -> Result<(), BoxError> {
        self(container, item)
    }
}

/// Pin a closure to the [`Operation`] signature so its argument types infer
pub fn operation<F>(f: F) -> F
where
    F: Fn(&str, &Item) -> Result<(), BoxError> + Sync,
{
    f
}

/// Number of workers used when none is configured
#[must_use]
pub fn default_workers() -> usize {
    num_cpus::get().max(1)
}

/// Counts reported by a successful run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Batches handed to workers
    pub batches: usize,
    /// Items in those batches, selected or not
    pub items: usize,
}

/// One pipeline configuration over a shared store
#[derive(Debug)]
pub struct Pipeline<'s, S: ?Sized> {
    store: &'s S,
    workers: usize,
}

impl<'s, S: Enumerator + ?Sized> Pipeline<'s, S> {
    #[must_use]
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            workers: default_workers(),
        }
    }

    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    #[must_use]
    pub const fn store(&self) -> &'s S {
        self.store
    }

    /// Apply `operation` to the items `policy` selects under every root
    ///
    /// # Errors
    /// Returns the first `PipelineError` of the run; see [`Pipeline::run_unfiltered`].
    pub fn run<O: Operation>(
        &self,
        roots: &[RootLocation],
        policy: &SelectionPolicy,
        operation: O,
    ) -> Result<RunSummary, PipelineError> {
        debug!(%policy, roots = roots.len(), "Selection resolved");
        self.run_unfiltered(roots, &policy.clone().build(operation))
    }

    /// Apply `operation` to every listed item under every root
    ///
    /// # Errors
    /// - `PipelineError::InvalidWorkerCount` before any listing if the pool is empty
    /// - `PipelineError::Enumeration` if listing a root failed
    /// - `PipelineError::Operation` for the first failing item
    /// - `PipelineError::Spawn` / `PipelineError::WorkerPanicked` for thread failures
    pub fn run_unfiltered<O: Operation + ?Sized>(
        &self,
        roots: &[RootLocation],
        operation: &O,
    ) -> Result<RunSummary, PipelineError> {
        if self.workers == 0 {
            return Err(PipelineError::InvalidWorkerCount);
        }

        thread::scope(|scope| {
            let (batch_tx, batch_rx) = bounded(0);
            let (failure_tx, failure_rx) = bounded(1);

            debug!("Starting {} workers", self.workers);
            let mut handles = Vec::with_capacity(self.workers);
            for id in 0..self.workers {
                let batches = batch_rx.clone();
                let failures = failure_tx.clone();
                let handle = thread::Builder::new()
                    .name(format!("s3kit-worker-{id}"))
                    .spawn_scoped(scope, move || worker_loop(id, &batches, operation, &failures))
                    .map_err(PipelineError::Spawn)?;
                handles.push(handle);
            }
            drop(batch_rx);
            drop(failure_tx);

            let dispatched = Dispatcher::new(self.store, batch_tx, failure_rx).dispatch(roots);

            let mut stats = WorkerStats::default();
            let mut failure = None;
            for handle in handles {
                match handle.join() {
                    Ok(Ok(worker)) => stats.merge(worker),
                    Ok(Err(e)) => {
                        failure.get_or_insert(e);
                    }
                    Err(_) => {
                        failure.get_or_insert(PipelineError::WorkerPanicked);
                    }
                }
            }
            debug!(batches = stats.batches, items = stats.items, "Complete");

            match (dispatched, failure) {
                (Err(e), _) | (Ok(_), Some(e)) => Err(e),
                (Ok(DispatchOutcome::Halted), None) => Err(PipelineError::WorkerPanicked),
                (Ok(DispatchOutcome::Completed), None) => Ok(RunSummary {
                    batches: stats.batches,
                    items: stats.items,
                }),
            }
        })
    }
}

/// Run one pipeline over `roots` with `workers` threads
///
/// # Errors
/// See [`Pipeline::run_unfiltered`].
pub fn run<S, O>(
    store: &S,
    roots: &[RootLocation],
    operation: O,
    policy: &SelectionPolicy,
    workers: usize,
) -> Result<RunSummary, PipelineError>
where
    S: Enumerator + ?Sized,
    O: Operation,
{
    Pipeline::new(store)
        .with_workers(workers)
        .run(roots, policy, operation)
}

#[cfg(test)]
mod tests;
