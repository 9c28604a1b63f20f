//! Batch orchestrator: dispatch, optional retry rounds, final report.

use log::info;
use std::sync::Arc;

use crate::engine::Reporter;
use crate::engine::worker::Worker;
use crate::error::BatchError;
use crate::pipeline::cancel::CancellationFlag;
use crate::pipeline::dispatch::Dispatcher;
use crate::{BatchReport, WorkItem};

/// Run `items` through `worker` on `max_parallel` slots and build the final report.
///
/// With `retries > 0`, items that failed are re-submitted as a fresh dispatcher run, one
/// round at a time, until nothing fails, the rounds are used up, or cancellation is set.
/// A retried item is never in flight twice.
pub fn run_items<W>(
    items: Vec<WorkItem>,
    max_parallel: usize,
    retries: u32,
    worker: Arc<W>,
    reporter: Arc<Reporter>,
    cancel: CancellationFlag,
) -> Result<BatchReport, BatchError>
where
    W: Worker + ?Sized + 'static,
{
    let dispatcher = Dispatcher::new(max_parallel, cancel.clone())?;
    let discovered = items.len();
    reporter.expect(discovered);

    let first = dispatcher.run(items, Arc::clone(&worker), Arc::clone(&reporter));
    let mut not_started = first.not_started;
    let mut cancelled = first.cancelled;
    let mut retry_rounds = 0;

    while retry_rounds < retries && !cancelled && reporter.summary().failed > 0 {
        retry_rounds += 1;
        let again = reporter.take_failed();
        info!(
            "retrying {} failed item(s) (round {}/{})",
            again.len(),
            retry_rounds,
            retries
        );
        let stats = dispatcher.run(again, Arc::clone(&worker), Arc::clone(&reporter));
        // A withdrawn failure that never restarts is left without any result.
        not_started += stats.not_started;
        cancelled = stats.cancelled;
    }

    Ok(BatchReport {
        tally: reporter.summary(),
        discovered,
        started: discovered - not_started,
        not_started,
        cancelled,
        retry_rounds,
        failures: reporter.failure_lines(),
        skipped: reporter.skip_lines(),
    })
}
