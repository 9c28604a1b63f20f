//! batchrun CLI: run one command per discovered input, N at a time.

use batchrun::engine::arg_parser::Cli;
use batchrun::engine::handle_run;
use batchrun::utils::setup_logging;
use clap::Parser;
use std::process::ExitCode;
use std::time::Instant;

fn main() -> ExitCode {
    let start_time = Instant::now();
    let cli = Cli::parse();
    setup_logging(cli.verbose.unwrap_or(false), !cli.no_color);
    let code = match handle_run(&cli) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            1
        }
    };
    log::debug!("Total time: {:?}", start_time.elapsed());
    ExitCode::from(code)
}
