//! CLI command handler: resolve options, discover, dispatch, summarize.

use anyhow::{Context, Result};
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::Opts;
use crate::engine::arg_parser::Cli;
use crate::engine::command::{CommandTemplate, CommandWorker};
use crate::engine::report::{Reporter, ReporterOpts};
use crate::error::BatchError;
use crate::pipeline::{
    CancelMonitor, CancellationFlag, ChildRegistry, DiscoverOpts, discover, run_items,
};
use crate::utils::batch_toml::{apply_file_to_opts, load_batch_toml};
use crate::utils::{WorkerSlotLimits, default_parallelism};

/// Defaults → config file → CLI flags.
pub fn setup_opts(cli: &Cli, cwd: &Path) -> Result<Opts> {
    let mut opts = Opts::default();
    if let Some(file) = load_batch_toml(cwd, cli.config.as_deref())? {
        apply_file_to_opts(&file, &mut opts);
    }
    if cli.parallel.is_some() {
        opts.parallel = cli.parallel;
    }
    if cli.output_dir.is_some() {
        opts.output_dir = cli.output_dir.clone();
    }
    if let Some(v) = cli.overwrite {
        opts.overwrite = v;
    }
    if let Some(secs) = cli.timeout {
        opts.timeout = Some(Duration::from_secs(secs));
    }
    if let Some(n) = cli.retries {
        opts.retries = n;
    }
    if let Some(n) = cli.diag_limit {
        opts.diag_limit = n;
    }
    if cli.require_companion.is_some() {
        opts.require_companion = cli.require_companion.clone();
    }
    if cli.no_list_detect {
        opts.detect_list = false;
    }
    if cli.no_color {
        opts.color = false;
    }
    if cli.summary_json.is_some() {
        opts.summary_json = cli.summary_json.clone();
    }
    if !cli.command.is_empty() {
        opts.command = cli.command.clone();
    }
    opts.verbose = cli.verbose.unwrap_or(false);
    Ok(opts)
}

/// Resolve the slot count: explicit value as given (0 is rejected later), else derived.
fn resolve_parallel(opts: &Opts) -> usize {
    opts.parallel.unwrap_or_else(|| {
        let limits = WorkerSlotLimits::current();
        default_parallelism(limits.all_threads, limits.floor)
    })
}

/// Create the output directory if needed; a non-directory in the way is a config error.
fn prepare_output_dir(opts: &Opts) -> Result<(), BatchError> {
    let Some(dir) = &opts.output_dir else {
        return Ok(());
    };
    if dir.exists() && !dir.is_dir() {
        return Err(BatchError::config(format!(
            "output dir {} exists and is not a directory",
            dir.display()
        )));
    }
    std::fs::create_dir_all(dir).map_err(|e| {
        BatchError::config(format!("create output dir {}: {e}", dir.display()))
    })
}

/// Run the batch described by `cli`. Returns the process exit code (0 or 1).
///
/// Config and no-input errors come back as `Err` before any worker starts.
pub fn handle_run(cli: &Cli) -> Result<u8> {
    let cwd = std::env::current_dir().context("read current directory")?;
    let opts = setup_opts(cli, &cwd)?;
    debug!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_uppercase(),
        opts
    );

    let max_parallel = resolve_parallel(&opts);
    if max_parallel < 1 {
        return Err(BatchError::config("--parallel must be at least 1").into());
    }
    let template = CommandTemplate::parse(&opts.command)?;
    let cancel = CancellationFlag::new();
    let registry = ChildRegistry::new();
    let worker = CommandWorker::new(template, &opts, registry.clone(), cancel.clone())?;
    prepare_output_dir(&opts)?;

    let items = discover(
        &cli.specifiers,
        &DiscoverOpts {
            detect_list: opts.detect_list,
            ..DiscoverOpts::default()
        },
    )?;
    info!(
        "{} item(s), {} at a time",
        items.len(),
        max_parallel.min(items.len())
    );

    let reporter = Arc::new(Reporter::stdout(ReporterOpts {
        color: opts.color,
        diag_limit: opts.diag_limit,
    }));
    let monitor = Arc::new(
        CancelMonitor::new(cancel.clone(), registry).with_reporter(Arc::clone(&reporter)),
    );
    monitor.install()?;

    let report = run_items(
        items,
        max_parallel,
        opts.retries,
        Arc::new(worker),
        Arc::clone(&reporter),
        cancel,
    )?;
    reporter.print_summary(&report);

    if let Some(path) = &opts.summary_json {
        let json = serde_json::to_string_pretty(&report).context("serialize summary")?;
        std::fs::write(path, json)
            .with_context(|| format!("write summary to {}", path.display()))?;
        debug!("summary written to {}", path.display());
    }
    Ok(report.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".batchrun.toml"),
            "[settings]\nparallel = 8\nretries = 1\ncommand = [\"gzip\"]\n",
        )
        .unwrap();
        let cli = Cli::try_parse_from(["batchrun", "x", "--parallel", "2"]).unwrap();
        let opts = setup_opts(&cli, dir.path()).unwrap();
        assert_eq!(opts.parallel, Some(2));
        assert_eq!(opts.retries, 1);
        assert_eq!(opts.command, ["gzip"]);
    }

    #[test]
    fn explicit_zero_parallel_is_kept_for_rejection() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from(["batchrun", "x", "-p", "0", "--", "true"]).unwrap();
        let opts = setup_opts(&cli, dir.path()).unwrap();
        assert_eq!(resolve_parallel(&opts), 0);
    }

    #[test]
    fn derived_parallel_is_positive() {
        assert!(resolve_parallel(&Opts::default()) >= 1);
    }

    #[test]
    fn output_dir_blocked_by_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("out");
        std::fs::write(&file, "").unwrap();
        let opts = Opts {
            output_dir: Some(file),
            ..Opts::default()
        };
        assert!(matches!(
            prepare_output_dir(&opts),
            Err(BatchError::Config(_))
        ));
    }

    #[test]
    fn output_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("a/b");
        let opts = Opts {
            output_dir: Some(out.clone()),
            ..Opts::default()
        };
        prepare_output_dir(&opts).unwrap();
        assert!(out.is_dir());
    }
}
