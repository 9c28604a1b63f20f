//! Public and internal types for the batchrun API and pipeline.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::config::DEFAULT_DIAG_LIMIT;

/// One unit of batch work: a file path, a URL, or any other identifier a worker understands.
///
/// `index` is the position assigned at discovery. It is only used to order summary output;
/// execution order is never tied to it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct WorkItem {
    pub index: usize,
    pub id: String,
}

impl WorkItem {
    pub fn new(index: usize, id: impl Into<String>) -> Self {
        Self {
            index,
            id: id.into(),
        }
    }

    /// The identifier interpreted as a filesystem path.
    pub fn as_path(&self) -> &Path {
        Path::new(&self.id)
    }

    /// True if the identifier looks like a URL rather than a path.
    pub fn is_url(&self) -> bool {
        self.id.contains("://")
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Terminal state of one item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure(String),
    /// Precondition not met. Counted separately from failures.
    Skipped(String),
}

impl Outcome {
    /// Short fixed-width tag used in report lines.
    pub fn tag(&self) -> &'static str {
        match self {
            Outcome::Success => "  ok",
            Outcome::Failure(_) => "FAIL",
            Outcome::Skipped(_) => "skip",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Success => None,
            Outcome::Failure(r) | Outcome::Skipped(r) => Some(r),
        }
    }
}

/// What a worker hands back for one item. Never mutated after creation.
#[derive(Clone, Debug, Serialize)]
pub struct WorkResult {
    pub item: WorkItem,
    pub outcome: Outcome,
    /// Captured output of the underlying process or request (may be empty).
    pub diagnostic: String,
}

impl WorkResult {
    pub fn success(item: WorkItem) -> Self {
        Self {
            item,
            outcome: Outcome::Success,
            diagnostic: String::new(),
        }
    }

    pub fn failure(item: WorkItem, reason: impl Into<String>) -> Self {
        Self {
            item,
            outcome: Outcome::Failure(reason.into()),
            diagnostic: String::new(),
        }
    }

    pub fn skipped(item: WorkItem, reason: impl Into<String>) -> Self {
        Self {
            item,
            outcome: Outcome::Skipped(reason.into()),
            diagnostic: String::new(),
        }
    }

    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = diagnostic.into();
        self
    }
}

/// Running counters for a batch. Only the [`Reporter`](crate::engine::Reporter) writes to it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Tally {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }

    pub(crate) fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Success => self.succeeded += 1,
            Outcome::Failure(_) => self.failed += 1,
            Outcome::Skipped(_) => self.skipped += 1,
        }
    }

    pub(crate) fn forget_failures(&mut self, n: usize) {
        self.failed = self.failed.saturating_sub(n);
    }
}

/// One failed or skipped item as shown in the summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ItemLine {
    pub index: usize,
    pub item: String,
    pub reason: String,
}

/// Final account of a batch run.
///
/// Items that were never started because of cancellation have no result; they are
/// counted in `not_started` instead of being folded into the tally.
#[derive(Clone, Debug, Default, Serialize)]
pub struct BatchReport {
    pub tally: Tally,
    pub discovered: usize,
    pub started: usize,
    pub not_started: usize,
    pub cancelled: bool,
    /// Retry rounds that actually ran (0 when nothing was retried).
    pub retry_rounds: u32,
    pub failures: Vec<ItemLine>,
    pub skipped: Vec<ItemLine>,
}

impl BatchReport {
    /// 0 when every item succeeded or was skipped, 1 on any failure or cancellation.
    pub fn exit_code(&self) -> u8 {
        if self.tally.failed > 0 || self.cancelled {
            1
        } else {
            0
        }
    }
}

/// Full options (CLI and config file).
#[derive(Clone, Debug)]
pub struct Opts {
    /// Worker slots. When None, derived from available threads and the FD limit.
    pub parallel: Option<usize>,
    /// Directory for `{out}` / `{outdir}` placeholders. Created if missing.
    pub output_dir: Option<PathBuf>,
    /// Run even when the `{out}` target already exists.
    pub overwrite: bool,
    /// Per-item wall clock limit for the child process.
    pub timeout: Option<Duration>,
    /// Sequential re-submission rounds for failed items.
    pub retries: u32,
    /// Max characters of diagnostic text kept per failed item.
    pub diag_limit: usize,
    /// Treat a single specifier naming a path/URL list file as that list.
    pub detect_list: bool,
    /// Colorize report tags.
    pub color: bool,
    /// Write the final report as JSON here.
    pub summary_json: Option<PathBuf>,
    /// Skip items whose `<dir>/<stem>.<ext>` companion is missing.
    pub require_companion: Option<String>,
    /// Command template (program followed by arguments).
    pub command: Vec<String>,
    pub verbose: bool,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            parallel: None,
            output_dir: None,
            overwrite: false,
            timeout: None,
            retries: 0,
            diag_limit: DEFAULT_DIAG_LIMIT,
            detect_list: true,
            color: true,
            summary_json: None,
            require_companion: None,
            command: Vec::new(),
            verbose: false,
        }
    }
}
