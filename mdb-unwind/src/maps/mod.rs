//! # Process Address Space
//!
//! An unwind needs to know, for every program counter it visits, which loaded
//! module owns it. This module models the process's memory map:
//!
//! ```text
//! /proc/self/maps line:
//!   7f3a1c200000-7f3a1c3a1000 r-xp 00028000 fd:01 1234  /usr/lib/libc.so.6
//!   └──── start ─┘└─── end ───┘ perms └offset┘ dev inode  name
//!
//! load base = start - offset
//! rel_pc    = pc - load base
//! ```
//!
//! ## Module Structure
//!
//! - **`map_info`**: one mapping ([`MapInfo`]) and its permission bits
//! - **`memory_maps`**: the [`Maps`] trait plus two sources
//!   - [`ProcMaps`]: procfs-backed, re-readable when new libraries appear
//!   - [`BufferMaps`]: parsed from an in-memory string
//!
//! Lookups are a binary search over entries sorted by start address.

pub mod map_info;
pub mod memory_maps;

pub use map_info::{MapFlags, MapInfo};
pub use memory_maps::{parse_maps, parse_maps_line, BufferMaps, Maps, ProcMaps, LOCAL_MAPS_PATH};
