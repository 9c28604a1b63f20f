//! Engine: CLI surface, reporting, process plumbing, and the bundled command worker.

pub mod arg_parser;
pub mod cli;
pub mod command;
pub mod process;
pub mod report;
pub mod tools;
pub mod worker;

// Re-export commonly used items
pub use arg_parser::Cli;
pub use cli::handle_run;
pub use command::{CommandTemplate, CommandWorker};
pub use process::{ProcessOutput, Termination, run_tracked};
pub use report::{Reporter, ReporterOpts};
pub use tools::{is_glob_pattern, normalize_item_path, split_glob_base, truncate_diagnostic};
pub use worker::Worker;
