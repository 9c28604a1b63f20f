use colored::Colorize;
use env_logger::Builder;
use log::{Level, LevelFilter};
use std::io::Write;

/// Diagnostics go to stderr; stdout carries only report lines and the summary.
///
/// `verbose` lowers this crate's level to Debug; dependencies stay at Warn unless
/// `RUST_LOG` says otherwise. `color = false` also turns off color for report tags.
pub fn setup_logging(verbose: bool, color: bool) {
    if !color {
        colored::control::set_override(false);
    }
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let _ = Builder::from_default_env()
        .filter_level(LevelFilter::Warn)
        .filter_module(env!("CARGO_PKG_NAME"), level)
        .target(env_logger::Target::Stderr)
        .format(|buf, record| {
            let name = env!("CARGO_PKG_NAME").cyan();
            let line = match record.level() {
                Level::Error => format!("[{} {}] {}", name, "ERROR".red().bold(), record.args()),
                Level::Warn => format!("[{} {}] {}", name, "WARN".yellow(), record.args()),
                Level::Info => format!("[{}] {}", name, record.args()),
                Level::Debug | Level::Trace => {
                    let target = record.target().trim_start_matches("batchrun::");
                    format!("[{} {}] {}", name, target.dimmed(), record.args())
                }
            };
            writeln!(buf, "{}", line)
        })
        .try_init();
}
