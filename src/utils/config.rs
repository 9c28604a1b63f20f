//! Application configuration constants.
//! Tuning and thresholds in one place.

use std::sync::OnceLock;
use std::time::Duration;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    config_filename: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                config_filename: format!(".{pkg}.toml"),
            }
        })
    }

    /// Name of the per-directory config file (e.g. `.batchrun.toml`).
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }
}

// ---- Worker slots ----

/// Slot limits used when `--parallel` is not given.
#[derive(Clone, Copy, Debug)]
pub struct WorkerSlotLimits {
    /// Available threads (from rayon); set by [`WorkerSlotLimits::current()`].
    pub all_threads: usize,
    /// Never go below this when deriving a default.
    pub floor: usize,
}

impl Default for WorkerSlotLimits {
    fn default() -> Self {
        Self {
            all_threads: 0, // use current() to set from rayon
            floor: Self::FLOOR_SLOTS,
        }
    }
}

impl WorkerSlotLimits {
    pub const FLOOR_SLOTS: usize = 1;

    /// Build limits with `all_threads` set from `rayon::current_num_threads()`.
    pub fn current() -> Self {
        Self {
            all_threads: rayon::current_num_threads(),
            ..Self::default()
        }
    }
}

// ---- Dispatch / process polling ----

/// How often the dispatcher and process waits re-check the cancellation flag.
/// Bounds cancellation latency.
pub const POLL_INTERVAL: Duration = Duration::from_millis(25);

// ---- Reporting ----

/// Default max characters of diagnostic text kept per failed item.
pub const DEFAULT_DIAG_LIMIT: usize = 300;

/// Separator used when flattening multi-line diagnostics onto one report line.
pub const DIAG_LINE_JOIN: &str = " | ";

// ---- Discovery ----

/// List-file auto-detection only reads files up to this size (bytes).
pub const LIST_DETECT_MAX_BYTES: u64 = 1024 * 1024;

/// Prefix marking a specifier as an explicit list file (`@paths.txt`).
pub const LIST_FILE_SENTINEL: char = '@';

/// Characters that turn a specifier into a glob pattern.
pub const GLOB_METACHARS: &[char] = &['*', '?', '[', '{'];
