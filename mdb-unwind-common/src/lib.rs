//! # Shared Constants (allocator shim ↔ unwinder)
//!
//! Constants shared between the `mdb-unwind` library and the allocation-debugging
//! shim that links against it. The shim may be built without `std`, so this crate
//! stays `no_std` and dependency-free.
//!
//! ## Key Items
//!
//! - [`DEFAULT_SKIP_LIBRARIES`] - modules whose frames never appear in a backtrace
//! - [`POINTER_HEX_WIDTH`] - zero-padded width of a program counter in log lines
//! - [`UNKNOWN_LOCATION`] / [`ANONYMOUS_PREFIX`] - placeholders for unattributed frames

#![no_std]

// ============================================================================
// Capture Limits
// ============================================================================

/// Default number of frames recorded per backtrace
///
/// Matches the depth the allocation-debugging layer records for each
/// allocation when no explicit `backtrace_frames` option is given.
pub const DEFAULT_MAX_FRAMES: usize = 16;

/// Upper bound on raw frames the unwinder will visit in one walk
///
/// Frames dropped by the deny-list still count against this budget, so a
/// corrupted chain that keeps landing in a skipped module cannot loop forever.
pub const MAX_UNWIND_STEPS: usize = 1024;

// ============================================================================
// Module Deny-List
// ============================================================================

/// Install locations of the instrumentation's own libraries (64-bit layout)
pub const SKIP_LIBRARIES_64: &[&str] =
    &["/system/lib64/libunwindstack.so", "/system/lib64/libc_malloc_debug.so"];

/// Install locations of the instrumentation's own libraries (32-bit layout)
pub const SKIP_LIBRARIES_32: &[&str] =
    &["/system/lib/libunwindstack.so", "/system/lib/libc_malloc_debug.so"];

/// Deny-list for the address width of this build
#[cfg(target_pointer_width = "64")]
pub const DEFAULT_SKIP_LIBRARIES: &[&str] = SKIP_LIBRARIES_64;

/// Deny-list for the address width of this build
#[cfg(not(target_pointer_width = "64"))]
pub const DEFAULT_SKIP_LIBRARIES: &[&str] = SKIP_LIBRARIES_32;

/// Environment variable overriding the deny-list (colon-separated paths)
pub const SKIP_LIBRARIES_ENV: &str = "MDB_UNWIND_SKIP_LIBRARIES";

// ============================================================================
// Log Line Layout
// ============================================================================

/// Hex digits used for a program counter (two per pointer byte)
pub const POINTER_HEX_WIDTH: usize = core::mem::size_of::<usize>() * 2;

/// Module column for a frame outside every known mapping
pub const UNKNOWN_LOCATION: &str = "<unknown>";

/// Module column prefix for a frame inside an unnamed mapping
///
/// Rendered as `<anonymous:START>` with the mapping start in hex.
pub const ANONYMOUS_PREFIX: &str = "<anonymous:";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_width_matches_build() {
        #[cfg(target_pointer_width = "64")]
        assert_eq!(POINTER_HEX_WIDTH, 16);
        #[cfg(target_pointer_width = "32")]
        assert_eq!(POINTER_HEX_WIDTH, 8);
    }

    #[test]
    fn test_skip_lists_differ_per_width() {
        assert_eq!(SKIP_LIBRARIES_64.len(), SKIP_LIBRARIES_32.len());
        for (wide, narrow) in SKIP_LIBRARIES_64.iter().zip(SKIP_LIBRARIES_32) {
            assert_ne!(wide, narrow);
            assert!(wide.starts_with("/system/lib64/"));
            assert!(narrow.starts_with("/system/lib/"));
        }
    }
}
