//! The extension point: anything that turns one [`WorkItem`] into a [`WorkResult`].

use anyhow::Result;

use crate::{WorkItem, WorkResult};

/// One unit of batch work. Implementations block while their external process or request
/// runs; the dispatcher provides the parallelism.
///
/// Returning `Err` (or panicking) is allowed: the dispatcher turns it into a `Failure`
/// result for that item and carries on with the rest of the batch.
pub trait Worker: Send + Sync {
    fn execute(&self, item: &WorkItem) -> Result<WorkResult>;
}

impl<F> Worker for F
where
    F: Fn(&WorkItem) -> Result<WorkResult> + Send + Sync,
{
    fn execute(&self, item: &WorkItem) -> Result<WorkResult> {
        self(item)
    }
}
