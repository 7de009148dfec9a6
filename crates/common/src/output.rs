//! Line-oriented report sinks.
//!
//! Every public entry point that reports progress takes a `&dyn LineSink`
//! instead of printing, so the CLI decides where lines go and tests can
//! capture them.

use std::sync::{Mutex, PoisonError};

pub trait LineSink: Send + Sync {
    /// Emit a normal report line (stdout in the CLI).
    fn emit(&self, line: &str);
    /// Emit an error report line (stderr in the CLI).
    fn emit_error(&self, line: &str);
}

/// Writes to the process stdout/stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdioSink;

impl LineSink for StdioSink {
    fn emit(&self, line: &str) {
        println!("{line}");
    }

    fn emit_error(&self, line: &str) {
        eprintln!("{line}");
    }
}

/// Collects lines in memory.
#[derive(Debug, Default)]
pub struct BufferSink {
    out: Mutex<Vec<String>>,
    err: Mutex<Vec<String>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.out
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn error_lines(&self) -> Vec<String> {
        self.err
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LineSink for BufferSink {
    fn emit(&self, line: &str) {
        self.out
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }

    fn emit_error(&self, line: &str) {
        self.err
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}
