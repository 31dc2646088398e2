//! Domain model for mdb-unwind
//!
//! This module contains core domain types and errors that provide:
//! - The init lifecycle of the process-wide context
//! - Structured error handling

pub mod errors;
pub mod types;

pub use types::InitState;

pub use errors::{MapsError, SymbolError, UnwindError};
