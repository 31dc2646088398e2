//! # Backtrace Rendering
//!
//! Turns captured [`FrameData`](crate::unwinding::FrameData) into log lines.
//! Each line carries the frame index, the module-relative pc, the owning
//! module (or a placeholder) and, when known, the demangled function name.
//! Missing information degrades to placeholder text; rendering never fails.
//!
//! - **`formatter`**: [`BacktraceFormatter`], the line layout
//! - **`demangle`**: the [`Demangler`] seam, Rust and Itanium C++ implementations
//! - **`sink`**: where lines go ([`LogCrateSink`], [`VecSink`])
//!
//! Demangling allocates; render outside any allocator-unsafe window.

pub mod demangle;
pub mod formatter;
pub mod sink;

pub use demangle::{CppDemangler, Demangler, RustDemangler, SymbolDemangler};
pub use formatter::BacktraceFormatter;
pub use sink::{LogCrateSink, LogSink, VecSink, BACKTRACE_LOG_TARGET};
