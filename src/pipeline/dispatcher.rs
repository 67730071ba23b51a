//! Listing side of the pipeline

use crossbeam_channel::{Receiver, Sender, select};
use std::ops::ControlFlow;
use tracing::{debug, warn};

use super::PipelineError;
use crate::location::RootLocation;
use crate::model::Batch;
use crate::store::Enumerator;

/// How the dispatcher left the listing loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchOutcome {
    /// Every page of every root was handed to a worker
    Completed,
    /// A worker reported a failure, or no worker was left to receive
    Halted,
}

/// Lists roots in order and hands each page to the next free worker
pub(crate) struct Dispatcher<'a, S: ?Sized> {
    store: &'a S,
    batches: Sender<Batch>,
    failures: Receiver<()>,
}

impl<'a, S: Enumerator + ?Sized> Dispatcher<'a, S> {
    pub(crate) const fn new(store: &'a S, batches: Sender<Batch>, failures: Receiver<()>) -> Self {
        Self {
            store,
            batches,
            failures,
        }
    }

    /// Consumes the dispatcher so the batch channel closes on return
    pub(crate) fn dispatch(self, roots: &[RootLocation]) -> Result<DispatchOutcome, PipelineError> {
        for root in roots {
            debug!(%root, "Listing");
            let mut halted = false;
            let listed = self.store.list_versions(root, &mut |items| {
                if items.is_empty() {
                    debug!(%root, "Skipping empty page");
                    return ControlFlow::Continue(());
                }
                let batch = Batch::new(root.container(), items);
                debug!(%root, items = batch.len(), "Sending batch");
                select! {
                    send(self.batches, batch) -> sent => {
                        if sent.is_err() {
                            halted = true;
                        }
                    }
                    recv(self.failures) -> _ => halted = true,
                }
                if halted {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            });

            if let Err(source) = listed {
                warn!(%root, "Listing failed: {source}");
                return Err(PipelineError::Enumeration {
                    root: root.to_string(),
                    source,
                });
            }
            if halted {
                debug!(%root, "Halting after worker failure");
                return Ok(DispatchOutcome::Halted);
            }
        }
        Ok(DispatchOutcome::Completed)
    }
}
