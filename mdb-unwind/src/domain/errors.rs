//! Structured error types for mdb-unwind
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MapsError {
    #[error("Failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed maps entry at line {line_no}: {line:?}")]
    Parse { line_no: usize, line: String },

    #[error("No mappings found in {path}")]
    Empty { path: PathBuf },
}

#[derive(Error, Debug)]
pub enum SymbolError {
    #[error("Failed to read module {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse object file {path}")]
    Object {
        path: PathBuf,
        #[source]
        source: object::Error,
    },

    #[error("Module {path} has no {section} section")]
    MissingSection { path: PathBuf, section: &'static str },
}

/// Reasons a capture produced no backtrace
///
/// None of these are fatal to the caller: the boolean entry point folds every
/// variant into `false` with empty outputs.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnwindError {
    #[error("Unwinder disabled: process memory maps could not be parsed")]
    Disabled,

    #[error("Unwind produced no frames")]
    EmptyUnwind,

    #[error("Register capture is not supported on {0}")]
    UnsupportedArch(&'static str),

    #[error("max_frames must be positive")]
    InvalidMaxFrames,
}
