//! Serialized, append-only console reporting.
//!
//! The reporter is the only writer of the output stream. Each `report` call formats and
//! writes one whole line while holding the single lock, and updates the tally under the
//! same lock, so concurrent workers can never interleave partial lines.

use colored::Colorize;
use std::collections::HashSet;
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread;
use std::time::Duration;

use crate::engine::tools::truncate_diagnostic;
use crate::utils::config::DEFAULT_DIAG_LIMIT;
use crate::{BatchReport, ItemLine, Outcome, Tally, WorkItem, WorkResult};

/// Attempts made by the signal path to take the output lock before giving up on it.
const CANCEL_LOCK_ATTEMPTS: usize = 20;
const CANCEL_LOCK_BACKOFF: Duration = Duration::from_millis(5);

#[derive(Clone, Copy, Debug)]
pub struct ReporterOpts {
    pub color: bool,
    pub diag_limit: usize,
}

impl Default for ReporterOpts {
    fn default() -> Self {
        Self {
            color: false,
            diag_limit: DEFAULT_DIAG_LIMIT,
        }
    }
}

struct ReporterState {
    out: Box<dyn Write + Send>,
    tally: Tally,
    seen: HashSet<String>,
    failed: Vec<(WorkItem, String)>,
    skipped: Vec<(WorkItem, String)>,
    expected: usize,
}

pub struct Reporter {
    state: Mutex<ReporterState>,
    opts: ReporterOpts,
}

impl Reporter {
    pub fn new(out: Box<dyn Write + Send>, opts: ReporterOpts) -> Self {
        Self {
            state: Mutex::new(ReporterState {
                out,
                tally: Tally::default(),
                seen: HashSet::new(),
                failed: Vec::new(),
                skipped: Vec::new(),
                expected: 0,
            }),
            opts,
        }
    }

    pub fn stdout(opts: ReporterOpts) -> Self {
        Self::new(Box::new(io::stdout()), opts)
    }

    fn lock(&self) -> MutexGuard<'_, ReporterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declare `n` more items as expected, so a cancellation notice can say how many
    /// never produced a result.
    pub fn expect(&self, n: usize) {
        self.lock().expected += n;
    }

    /// Record one result and print its line. Returns false (and prints nothing) if this
    /// item was already reported: delivery is de-duplicated by item id.
    pub fn report(&self, result: WorkResult) -> bool {
        let line = self.format_line(&result);
        let mut state = self.lock();
        if !state.seen.insert(result.item.id.clone()) {
            log::debug!("duplicate result for {} ignored", result.item);
            return false;
        }
        state.tally.record(&result.outcome);
        match result.outcome {
            Outcome::Success => {}
            Outcome::Failure(reason) => state.failed.push((result.item, reason)),
            Outcome::Skipped(reason) => state.skipped.push((result.item, reason)),
        }
        if let Err(e) = writeln!(state.out, "{line}") {
            log::debug!("report write failed: {}", e);
        }
        true
    }

    /// Current tally (exact once all workers have reported).
    pub fn summary(&self) -> Tally {
        self.lock().tally
    }

    /// Withdraw all failed items so they can be re-submitted. Their failure lines stay
    /// printed, but they no longer count and may be reported again.
    pub fn take_failed(&self) -> Vec<WorkItem> {
        let mut state = self.lock();
        let failed = std::mem::take(&mut state.failed);
        state.tally.forget_failures(failed.len());
        let mut items = Vec::with_capacity(failed.len());
        for (item, _) in failed {
            state.seen.remove(&item.id);
            items.push(item);
        }
        items.sort_by_key(|i| i.index);
        items
    }

    /// Failure lines sorted by discovery order.
    pub fn failure_lines(&self) -> Vec<ItemLine> {
        sorted_lines(&self.lock().failed)
    }

    /// Skip lines sorted by discovery order.
    pub fn skip_lines(&self) -> Vec<ItemLine> {
        sorted_lines(&self.lock().skipped)
    }

    /// Print the final summary block.
    pub fn print_summary(&self, report: &BatchReport) {
        let block = self.format_summary(report);
        let mut state = self.lock();
        let _ = state.out.write_all(block.as_bytes());
        let _ = state.out.flush();
    }

    /// Best-effort final line from the signal path. Never blocks for long: if a worker
    /// is stuck mid-write, the line goes to stderr instead.
    pub fn cancel_notice(&self, killed: usize) {
        for _ in 0..CANCEL_LOCK_ATTEMPTS {
            match self.state.try_lock() {
                Ok(mut state) => {
                    let line = cancel_line(&state, killed);
                    let _ = writeln!(state.out, "{line}");
                    let _ = state.out.flush();
                    return;
                }
                Err(TryLockError::Poisoned(p)) => {
                    let mut state = p.into_inner();
                    let line = cancel_line(&state, killed);
                    let _ = writeln!(state.out, "{line}");
                    let _ = state.out.flush();
                    return;
                }
                Err(TryLockError::WouldBlock) => thread::sleep(CANCEL_LOCK_BACKOFF),
            }
        }
        eprintln!("canceled by user");
    }

    fn paint(&self, outcome: &Outcome) -> String {
        let tag = outcome.tag();
        if !self.opts.color {
            return tag.to_string();
        }
        match outcome {
            Outcome::Success => tag.green().to_string(),
            Outcome::Failure(_) => tag.red().bold().to_string(),
            Outcome::Skipped(_) => tag.yellow().to_string(),
        }
    }

    fn format_line(&self, result: &WorkResult) -> String {
        let tag = self.paint(&result.outcome);
        match result.outcome.reason() {
            Some(reason) => format!(
                "[{}] {}: {}",
                tag,
                result.item,
                truncate_diagnostic(reason, self.opts.diag_limit)
            ),
            None => format!("[{}] {}", tag, result.item),
        }
    }

    fn format_summary(&self, report: &BatchReport) -> String {
        let t = &report.tally;
        let mut s = String::new();
        s.push_str("---\n");
        s.push_str(&format!(
            "succeeded: {}  failed: {}  skipped: {}  (of {} discovered)\n",
            t.succeeded, t.failed, t.skipped, report.discovered
        ));
        if report.retry_rounds > 0 {
            s.push_str(&format!("retry rounds: {}\n", report.retry_rounds));
        }
        if !report.failures.is_empty() {
            s.push_str("failed:\n");
            for line in &report.failures {
                s.push_str(&format!(
                    "  {}: {}\n",
                    line.item,
                    truncate_diagnostic(&line.reason, self.opts.diag_limit)
                ));
            }
        }
        if !report.skipped.is_empty() {
            s.push_str("skipped:\n");
            for line in &report.skipped {
                s.push_str(&format!("  {}: {}\n", line.item, line.reason));
            }
        }
        if report.cancelled {
            s.push_str(&format!(
                "canceled by user: {} item(s) never started\n",
                report.not_started
            ));
        }
        s
    }
}

fn cancel_line(state: &ReporterState, killed: usize) -> String {
    let t = state.tally;
    format!(
        "canceled by user: {} process(es) killed, {} of {} item(s) without a result \
         (succeeded: {} failed: {} skipped: {})",
        killed,
        state.expected.saturating_sub(t.total()),
        state.expected,
        t.succeeded,
        t.failed,
        t.skipped
    )
}

fn sorted_lines(entries: &[(WorkItem, String)]) -> Vec<ItemLine> {
    let mut lines: Vec<ItemLine> = entries
        .iter()
        .map(|(item, reason)| ItemLine {
            index: item.index,
            item: item.id.clone(),
            reason: reason.clone(),
        })
        .collect();
    lines.sort_by_key(|l| l.index);
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Buf(Arc<Mutex<Vec<u8>>>);

    impl Write for Buf {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Buf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn reporter(buf: &Buf, diag_limit: usize) -> Reporter {
        Reporter::new(
            Box::new(buf.clone()),
            ReporterOpts {
                color: false,
                diag_limit,
            },
        )
    }

    #[test]
    fn one_line_per_outcome() {
        let buf = Buf::default();
        let r = reporter(&buf, 100);
        r.report(WorkResult::success(WorkItem::new(0, "a.txt")));
        r.report(WorkResult::failure(
            WorkItem::new(1, "b.txt"),
            "exit 1\nboom",
        ));
        r.report(WorkResult::skipped(WorkItem::new(2, "c.txt"), "output exists"));
        assert_eq!(
            buf.text(),
            "[  ok] a.txt\n[FAIL] b.txt: exit 1 | boom\n[skip] c.txt: output exists\n"
        );
    }

    #[test]
    fn long_reason_is_truncated() {
        let buf = Buf::default();
        let r = reporter(&buf, 8);
        r.report(WorkResult::failure(WorkItem::new(0, "x"), "0123456789abcdef"));
        assert_eq!(buf.text(), "[FAIL] x: …9abcdef\n");
    }

    #[test]
    fn take_failed_allows_rereport() {
        let buf = Buf::default();
        let r = reporter(&buf, 100);
        r.report(WorkResult::failure(WorkItem::new(3, "late"), "e"));
        r.report(WorkResult::failure(WorkItem::new(1, "early"), "e"));
        r.report(WorkResult::success(WorkItem::new(2, "fine")));
        let again = r.take_failed();
        assert_eq!(
            again.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(),
            ["early", "late"]
        );
        assert_eq!(r.summary().failed, 0);
        assert!(r.report(WorkResult::success(WorkItem::new(1, "early"))));
        assert_eq!(r.summary().succeeded, 2);
    }

    #[test]
    fn cancel_notice_counts_missing_results() {
        let buf = Buf::default();
        let r = reporter(&buf, 100);
        r.expect(10);
        r.report(WorkResult::success(WorkItem::new(0, "a")));
        r.cancel_notice(2);
        let text = buf.text();
        assert!(text.contains("canceled by user: 2 process(es) killed, 9 of 10"));
    }

    #[test]
    fn summary_lists_failures_in_discovery_order() {
        let buf = Buf::default();
        let r = reporter(&buf, 100);
        r.report(WorkResult::failure(WorkItem::new(5, "z"), "bad"));
        r.report(WorkResult::failure(WorkItem::new(0, "a"), "worse"));
        let report = BatchReport {
            tally: r.summary(),
            discovered: 6,
            failures: r.failure_lines(),
            ..Default::default()
        };
        r.print_summary(&report);
        let text = buf.text();
        let a = text.find("  a: worse").unwrap();
        let z = text.find("  z: bad").unwrap();
        assert!(a < z);
        assert!(text.contains("succeeded: 0  failed: 2  skipped: 0  (of 6 discovered)"));
    }
}
