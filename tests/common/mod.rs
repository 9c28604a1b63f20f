//! Shared helpers for integration tests.
#![allow(dead_code)]

use batchrun::engine::{Reporter, ReporterOpts};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Cloneable in-memory writer so tests can read back what the reporter printed.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuf {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    pub fn lines(&self) -> Vec<String> {
        self.text().lines().map(str::to_string).collect()
    }
}

pub fn buffered_reporter() -> (Arc<Reporter>, SharedBuf) {
    let buf = SharedBuf::default();
    let reporter = Reporter::new(
        Box::new(buf.clone()),
        ReporterOpts {
            color: false,
            diag_limit: 200,
        },
    );
    (Arc::new(reporter), buf)
}

/// Split a report line into (tag, rest). None if the line is not a whole result line.
pub fn parse_line(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix('[')?;
    let (tag, rest) = rest.split_once("] ")?;
    matches!(tag, "  ok" | "FAIL" | "skip").then_some((tag, rest))
}
