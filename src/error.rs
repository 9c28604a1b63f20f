//! Fatal errors: the only ones allowed to stop a batch before any worker runs.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchError {
    /// Invalid parallelism, bad template, unusable output directory, bad glob.
    #[error("configuration error: {0}")]
    Config(String),

    /// Discovery produced zero items across all specifiers.
    #[error("no input matched ({specifiers} specifier(s) given)")]
    NoInput { specifiers: usize },
}

impl BatchError {
    pub fn config(msg: impl Into<String>) -> Self {
        BatchError::Config(msg.into())
    }
}
