//! # Stack Unwinding
//!
//! Turns a register snapshot into an ordered list of [`FrameData`]:
//!
//! ```text
//! Regs { pc, sp, fp, lr }
//!    │
//!    ▼
//! Unwinder ──▶ Maps::find(pc)         which module owns this pc?
//!    │     ──▶ .eh_frame (framehop)   how to recover the caller's registers
//!    │     ──▶ ProcessMemory::read    saved registers on the stack
//!    │     ──▶ SymbolLookup           raw function name + offset
//!    ▼
//! Vec<FrameData>  (innermost first, deny-listed modules removed)
//! ```
//!
//! ## Module Structure
//!
//! - **`regs`**: register snapshot of the calling frame
//! - **`memory`**: fault-tolerant local memory reads, per-thread page cache
//! - **`symbols`**: ELF symbol tables cached per module path
//! - **`frame`**: the [`FrameData`] record
//! - **`unwinder`**: the [`Unwinder`] trait and the frame-pointer walker
//! - **`cfi`**: the default [`CfiUnwinder`], driven by DWARF call frame information
//!
//! ## Reentrancy
//!
//! Captures may run while the instrumented allocator is mid-operation. The
//! memory readers never allocate and frame storage is reserved once per
//! capture. Symbol lookup and the first visit of a module by [`CfiUnwinder`]
//! read module files and allocate; callers that cannot tolerate that should
//! plug in [`NoSymbols`] and [`FramePointerUnwinder`].

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
pub mod cfi;
pub mod frame;
pub mod memory;
pub mod regs;
pub mod symbols;
pub mod unwinder;

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
pub use cfi::{CfiUnwinder, ModuleUnwindInfo};
pub use frame::FrameData;
pub use memory::{LocalProcessMemory, ProcessMemory, ThreadCachedMemory};
pub use regs::Regs;
pub use symbols::{ElfSymbolCache, ModuleSymbols, NoSymbols, SymbolLookup};
pub use unwinder::{FramePointerUnwinder, UnwindRequest, Unwinder};
