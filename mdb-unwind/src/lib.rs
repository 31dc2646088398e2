//! # mdb-unwind - In-Process Backtraces for Memory Debugging
//!
//! Captures the calling thread's call stack on demand and renders it as
//! readable log lines. Built for an allocation-debugging layer that has to
//! report where a leak, double free or use-after-free happened.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                 Allocation-debugging layer                    │
//! └────────────┬──────────────────────────────────┬───────────────┘
//!              │ unwind(&mut pcs, &mut info, n)   │ unwind_log(&info)
//!              ▼                                  ▼
//! ┌──────────────────────────┐      ┌──────────────────────────────┐
//! │  context (InitGuard)     │      │  format                      │
//! │  once: parse maps,       │      │  BacktraceFormatter          │
//! │  memory reader, symbols  │      │   ├─ module / offset columns │
//! └────────────┬─────────────┘      │   ├─ Demangler               │
//!              ▼                    │   └─ LogSink                 │
//! ┌──────────────────────────┐      └──────────────────────────────┘
//! │  backtrace (capture)     │
//! │  Regs ─▶ CfiUnwinder ─▶  │
//! │  deny-list filter        │
//! └──────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`context`]: process-wide maps/memory/symbol state behind an exactly-once guard
//! - [`backtrace`]: register snapshot, unwind, paired pc/frame output
//! - [`format`]: frame → line rendering, demangling, log sinks
//! - [`unwinding`]: unwinder trait, CFI and frame-pointer walkers, memory and symbol readers
//! - [`maps`]: `/proc/self/maps` parsing and address → module lookup
//! - [`config`]: the module deny-list
//! - [`domain`]: error types and the init lifecycle
//!
//! ## Failure Model
//!
//! Capture never panics and never returns partial output. If the memory
//! maps cannot be parsed the first time, backtraces stay disabled for the
//! life of the process. Rendering never fails; unresolved modules and
//! symbols show up as `<unknown>` / `<anonymous:ADDR>` or a raw name.
//!
//! ## Typical Usage
//!
//! ```rust,ignore
//! let mut pcs = Vec::new();
//! let mut info = Vec::new();
//! if mdb_unwind::unwind(&mut pcs, &mut info, 16) {
//!     // ... record pcs with the allocation ...
//!     mdb_unwind::unwind_log(&info);
//! }
//! ```
//!
//! The default unwinder evaluates `.eh_frame` CFI, so frames from libc and
//! other code built without frame pointers are walked through.

pub mod backtrace;
pub mod config;
pub mod context;
pub mod domain;
pub mod format;
pub mod maps;
pub mod unwinding;

pub use backtrace::{capture_with, unwind, Backtrace, BacktraceCapture};
pub use config::UnwindConfig;
pub use context::{InitGuard, ProcessUnwindContext};
pub use domain::{InitState, MapsError, SymbolError, UnwindError};
pub use format::{
    BacktraceFormatter, CppDemangler, Demangler, LogCrateSink, LogSink, RustDemangler, SymbolDemangler,
};
pub use unwinding::FrameData;

/// Render `frame_info` and send each line to the `log` facade
pub fn unwind_log(frame_info: &[FrameData]) {
    let formatter: BacktraceFormatter = BacktraceFormatter::default();
    formatter.log(frame_info, &LogCrateSink);
}
