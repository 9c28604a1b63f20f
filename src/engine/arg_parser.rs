use clap::Parser;
use std::path::PathBuf;

/// Bounded-parallelism batch runner.
///
/// Expands SPECIFIERS (paths, glob patterns, `@list.txt`) into items and runs COMMAND once
/// per item. COMMAND placeholders: {} {input} {name} {stem} {ext} {dir} {outdir} {out}.
/// Without {} / {input}, the item is appended as the last argument.
#[derive(Clone, Debug, Parser)]
#[command(name = "batchrun", version)]
#[command(about = "Run one command per input file, N at a time.")]
pub struct Cli {
    /// Input paths, glob patterns, URLs, or @FILE list files.
    #[arg(value_name = "SPECIFIERS")]
    pub specifiers: Vec<String>,

    /// Command template to run per item (after `--`).
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<String>,

    /// Max items processed at once. Default: available threads, capped by the FD limit.
    #[arg(long, short = 'p', value_name = "N")]
    pub parallel: Option<usize>,

    /// Directory for {out}/{outdir}. Created if missing.
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output_dir: Option<PathBuf>,

    /// Run even if the {out} target already exists. `--overwrite=false` undoes a config value.
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub overwrite: Option<bool>,

    /// Kill an item's process after this many seconds.
    #[arg(long, short = 't', value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Re-submit failed items up to N more times, one round at a time.
    #[arg(long, short = 'r', value_name = "N")]
    pub retries: Option<u32>,

    /// Max characters of diagnostic text shown per failed item.
    #[arg(long, value_name = "N")]
    pub diag_limit: Option<usize>,

    /// Skip items whose companion file (same stem, this extension) is missing.
    #[arg(long, value_name = "EXT")]
    pub require_companion: Option<String>,

    /// Never treat a lone specifier as a list file unless it is written as @FILE.
    #[arg(long)]
    pub no_list_detect: bool,

    /// Plain report tags without color.
    #[arg(long)]
    pub no_color: bool,

    /// Also write the final report as JSON to this path.
    #[arg(long, value_name = "PATH")]
    pub summary_json: Option<PathBuf>,

    /// Config file. Default: `.batchrun.toml` in the current directory, if present.
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Verbose output.
    #[arg(long, short = 'v', num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,
}
