//! batchrun: bounded-parallelism batch processing of files, URLs, or other work items.
//!
//! Discovery → Dispatch → Worker → Reporter, with a cancellation monitor alongside
//! dispatch. Plug in any [`Worker`](engine::Worker); the CLI ships
//! [`CommandWorker`](engine::CommandWorker), which runs an external command per item.

pub mod engine;
pub mod error;
pub mod pipeline;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use error::BatchError;
pub use types::*;

use log::debug;
use std::sync::Arc;

use engine::{Reporter, Worker};
use pipeline::{CancellationFlag, DiscoverOpts};

/// Result alias used by public batchrun API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Single entry point for library use: discover `specifiers`, run every item through
/// `worker` on `max_parallel` slots, and return the final report.
///
/// - Fails with [`BatchError::Config`] if `max_parallel` is 0 and with
///   [`BatchError::NoInput`] if nothing matched; no worker runs in either case.
/// - `cancel` lets the caller stop the batch; unstarted items then get no result and are
///   counted in [`BatchReport::not_started`]. No signal handler is installed here; use
///   [`CancelMonitor`](pipeline::CancelMonitor) for that.
///
/// ```ignore
/// let reporter = Arc::new(Reporter::stdout(ReporterOpts::default()));
/// let worker = |item: &WorkItem| -> anyhow::Result<WorkResult> {
///     std::fs::metadata(item.as_path())?;
///     Ok(WorkResult::success(item.clone()))
/// };
/// let report = batchrun::run_batch(&specs, 4, Arc::new(worker), reporter, CancellationFlag::new())?;
/// std::process::exit(report.exit_code().into());
/// ```
pub fn run_batch<W>(
    specifiers: &[String],
    max_parallel: usize,
    worker: Arc<W>,
    reporter: Arc<Reporter>,
    cancel: CancellationFlag,
) -> std::result::Result<BatchReport, BatchError>
where
    W: Worker + ?Sized + 'static,
{
    if max_parallel < 1 {
        return Err(BatchError::config("max_parallel must be at least 1"));
    }
    let items = pipeline::discover(specifiers, &DiscoverOpts::default())?;
    debug!("run_batch: {} item(s) on {} slot(s)", items.len(), max_parallel);
    pipeline::run_items(items, max_parallel, 0, worker, reporter, cancel)
}
