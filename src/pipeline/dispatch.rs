//! Bounded dispatch: `max_parallel` worker threads fed through a rendezvous channel.
//!
//! The submission loop hands an item over only when a worker is idle, so nothing queues
//! ahead of the pool and cancellation leaves no buffered work behind. Every send and the
//! final wait poll the cancellation flag at [`POLL_INTERVAL`].

use crossbeam_channel::{RecvTimeoutError, SendTimeoutError, bounded};
use log::{debug, warn};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::engine::Reporter;
use crate::engine::tools::panic_message;
use crate::engine::worker::Worker;
use crate::error::BatchError;
use crate::pipeline::cancel::CancellationFlag;
use crate::pipeline::pool::PoolState;
use crate::utils::config::POLL_INTERVAL;
use crate::{WorkItem, WorkResult};

/// What one dispatcher run did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub submitted: usize,
    pub started: usize,
    /// Items that never reached a worker because of cancellation.
    pub not_started: usize,
    /// Highest number of workers executing at the same time.
    pub peak_parallel: usize,
    pub cancelled: bool,
}

pub struct Dispatcher {
    max_parallel: usize,
    cancel: CancellationFlag,
}

impl Dispatcher {
    pub fn new(max_parallel: usize, cancel: CancellationFlag) -> Result<Self, BatchError> {
        if max_parallel < 1 {
            return Err(BatchError::config(format!(
                "parallelism must be at least 1 (got {max_parallel})"
            )));
        }
        Ok(Self {
            max_parallel,
            cancel,
        })
    }

    /// Run every item through `worker`, at most `max_parallel` at a time, forwarding each
    /// result to `reporter` as it completes.
    ///
    /// Returns once all items have finished, or as soon as cancellation is observed. On
    /// cancellation, in-flight workers are abandoned (their threads are not joined) and
    /// unsubmitted items produce no result.
    pub fn run<W>(
        &self,
        items: Vec<WorkItem>,
        worker: Arc<W>,
        reporter: Arc<Reporter>,
    ) -> DispatchStats
    where
        W: Worker + ?Sized + 'static,
    {
        let total = items.len();
        let pool = PoolState::new(self.max_parallel);
        let (item_tx, item_rx) = bounded::<WorkItem>(0);
        // Workers hold a sender each; disconnection means every worker has exited.
        let (exit_tx, exit_rx) = bounded::<()>(0);

        let n_threads = self.max_parallel.min(total);
        debug!("dispatching {} item(s) on {} slot(s)", total, n_threads);
        let handles: Vec<JoinHandle<()>> = (0..n_threads)
            .map(|_| {
                let item_rx = item_rx.clone();
                let exit_tx = exit_tx.clone();
                let pool = Arc::clone(&pool);
                let worker = Arc::clone(&worker);
                let reporter = Arc::clone(&reporter);
                let cancel = self.cancel.clone();
                thread::spawn(move || {
                    while let Ok(item) = item_rx.recv() {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let slot = pool.acquire();
                        let result = execute_isolated(&*worker, item);
                        drop(slot);
                        reporter.report(result);
                    }
                    drop(exit_tx);
                })
            })
            .collect();
        drop(item_rx);
        drop(exit_tx);

        let mut submitted = 0;
        'items: for item in items {
            let mut pending = item;
            loop {
                if self.cancel.is_cancelled() {
                    break 'items;
                }
                match item_tx.send_timeout(pending, POLL_INTERVAL) {
                    Ok(()) => {
                        submitted += 1;
                        break;
                    }
                    Err(SendTimeoutError::Timeout(back)) => pending = back,
                    Err(SendTimeoutError::Disconnected(_)) => {
                        warn!(
                            "all workers exited early; {} item(s) unsubmitted",
                            total - submitted
                        );
                        break 'items;
                    }
                }
            }
        }
        drop(item_tx);

        let cancelled = loop {
            match exit_rx.recv_timeout(POLL_INTERVAL) {
                Ok(()) | Err(RecvTimeoutError::Timeout) => {
                    if self.cancel.is_cancelled() {
                        break true;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break self.cancel.is_cancelled(),
            }
        };
        if !cancelled {
            for h in handles {
                let _ = h.join();
            }
        }

        let started = pool.started();
        let stats = DispatchStats {
            submitted,
            started,
            not_started: total - started,
            peak_parallel: pool.peak(),
            cancelled,
        };
        if cancelled {
            warn!(
                "canceled: {} of {} item(s) never started and have no result",
                stats.not_started, total
            );
        }
        debug!("dispatch done: {:?}", stats);
        stats
    }
}

/// Run one item, turning an `Err` or a panic into a `Failure` for that item only.
fn execute_isolated<W: Worker + ?Sized>(worker: &W, item: WorkItem) -> WorkResult {
    match catch_unwind(AssertUnwindSafe(|| worker.execute(&item))) {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => WorkResult::failure(item, format!("{e:#}")),
        Err(payload) => WorkResult::failure(
            item,
            format!("worker panicked: {}", panic_message(payload.as_ref())),
        ),
    }
}
