//! Destinations for rendered backtrace lines

use log::error;
use std::sync::{Mutex, PoisonError};

/// Log target used by [`LogCrateSink`]
pub const BACKTRACE_LOG_TARGET: &str = "mdb_unwind::backtrace";

/// Receives one rendered line per call, in frame order
pub trait LogSink {
    fn log_line(&self, line: &str);
}

/// Sends lines to the `log` facade at error level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCrateSink;

impl LogSink for LogCrateSink {
    fn log_line(&self, line: &str) {
        error!(target: BACKTRACE_LOG_TARGET, "{line}");
    }
}

/// Collects lines in memory
#[derive(Debug, Default)]
pub struct VecSink {
    lines: Mutex<Vec<String>>,
}

impl VecSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines received so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl LogSink for VecSink {
    fn log_line(&self, line: &str) {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).push(line.to_string());
    }
}
