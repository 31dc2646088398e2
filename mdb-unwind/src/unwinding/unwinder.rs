//! Walking the call stack from a register snapshot
//!
//! [`FramePointerUnwinder`] follows the chain of saved frame pointers. It is
//! the fallback to the CFI-driven [`CfiUnwinder`](super::cfi::CfiUnwinder)
//! and only works for code built with frame pointers. On both x86_64 and
//! aarch64 a frame record is two words:
//!
//! ```text
//!   fp + 0 ──▶ caller's fp
//!   fp + W ──▶ return address into the caller
//! ```
//!
//! The walk stops at the frame limit, at a pc outside every mapping, when the
//! next record is unreadable, misaligned or not above the current one, or
//! after [`MAX_UNWIND_STEPS`] records.

use log::{debug, trace};
use mdb_unwind_common::MAX_UNWIND_STEPS;
use std::sync::Arc;

use super::frame::FrameData;
use super::memory::ProcessMemory;
use super::regs::Regs;
use super::symbols::SymbolLookup;
use crate::maps::{MapInfo, Maps};

const WORD_SIZE: u64 = std::mem::size_of::<usize>() as u64;

/// Everything one unwind reads from
pub struct UnwindRequest<'a> {
    pub regs: Regs,
    pub maps: &'a dyn Maps,
    pub memory: &'a dyn ProcessMemory,
    pub symbols: &'a dyn SymbolLookup,
    /// Maximum number of frames in the result
    pub max_frames: usize,
    /// Modules whose frames are dropped from the result
    pub skip_libraries: &'a [String],
    /// Innermost raw frames to drop, e.g. the capture call's own frame
    pub skip_frames: usize,
}

impl UnwindRequest<'_> {
    fn is_skipped(&self, map: &MapInfo) -> bool {
        self.skip_libraries.iter().any(|lib| *lib == map.name)
    }

    /// Whether raw frame number `step` owned by `map` belongs in the result
    pub(super) fn records(&self, step: usize, map: Option<&MapInfo>) -> bool {
        if step < self.skip_frames {
            return false;
        }
        if map.is_some_and(|m| self.is_skipped(m)) {
            trace!("Skipping frame {step} in deny-listed module");
            return false;
        }
        true
    }
}

/// Describe one frame, resolving its function name
///
/// `is_return_address` is true for every frame but the innermost one.
pub(super) fn build_frame(
    num: usize,
    pc: u64,
    sp: u64,
    is_return_address: bool,
    map_info: Option<Arc<MapInfo>>,
    request: &UnwindRequest<'_>,
) -> FrameData {
    let rel_pc = map_info.as_ref().map_or(pc, |m| m.rel_pc(pc));
    // A return address points after the call; look up the call itself.
    let lookup_pc = if is_return_address { pc.saturating_sub(1) } else { pc };
    let (function_name, function_offset) = map_info
        .as_deref()
        .and_then(|m| request.symbols.function_name(m, lookup_pc))
        .map_or((String::new(), 0), |(name, offset)| (name, offset + (pc - lookup_pc)));

    FrameData { num, pc, rel_pc, sp, map_info, function_name, function_offset }
}

/// Produces frames, innermost first, for a register snapshot
///
/// Must be safe to call repeatedly and from several threads at once.
pub trait Unwinder: Send + Sync {
    fn unwind(&self, request: &UnwindRequest<'_>) -> Vec<FrameData>;
}

/// Unwinder following saved frame pointers
///
/// Requires code built with frame pointers (`-C force-frame-pointers=yes`);
/// frames from code without them end the walk early.
#[derive(Debug, Clone, Copy)]
pub struct FramePointerUnwinder {
    max_steps: usize,
}

impl Default for FramePointerUnwinder {
    fn default() -> Self {
        Self::new()
    }
}

impl FramePointerUnwinder {
    #[must_use]
    pub const fn new() -> Self {
        Self { max_steps: MAX_UNWIND_STEPS }
    }

    /// Cap on frame records visited, including skipped ones
    #[must_use]
    pub const fn with_max_steps(max_steps: usize) -> Self {
        Self { max_steps }
    }

    /// Read the frame record at `fp`: (caller fp, return address)
    fn read_record(fp: u64, lookup: &mut MapLookup<'_, '_>) -> Option<(u64, u64)> {
        if fp == 0 || fp % WORD_SIZE != 0 {
            return None;
        }
        let record_end = fp.checked_add(2 * WORD_SIZE)?;
        let map = lookup.find(fp)?;
        if !map.flags.read || record_end > map.end {
            trace!("frame record at 0x{fp:x} is not in readable memory");
            return None;
        }
        let memory = lookup.request.memory;
        Some((memory.read_word(fp)?, memory.read_word(fp + WORD_SIZE)?))
    }
}

/// Map lookups for one walk, reparsing at most once on a miss
pub(super) struct MapLookup<'r, 'a> {
    request: &'r UnwindRequest<'a>,
    reparsed: bool,
}

impl<'r, 'a> MapLookup<'r, 'a> {
    pub(super) fn new(request: &'r UnwindRequest<'a>) -> Self {
        Self { request, reparsed: false }
    }

    pub(super) fn find(&mut self, addr: u64) -> Option<Arc<MapInfo>> {
        if let Some(map) = self.request.maps.find(addr) {
            return Some(map);
        }
        if self.reparsed {
            return None;
        }
        self.reparsed = true;
        match self.request.maps.reparse() {
            Ok(true) => {
                debug!("Maps reparsed after miss at 0x{addr:x}");
                self.request.maps.find(addr)
            }
            Ok(false) => None,
            Err(e) => {
                debug!("Maps reparse failed: {e}");
                None
            }
        }
    }
}

impl Unwinder for FramePointerUnwinder {
    fn unwind(&self, request: &UnwindRequest<'_>) -> Vec<FrameData> {
        let mut frames = Vec::with_capacity(request.max_frames);
        let mut lookup = MapLookup::new(request);

        let mut pc = request.regs.pc;
        let mut sp = request.regs.sp;
        let mut fp = request.regs.fp;
        let mut chain_ok = true;

        for step in 0..self.max_steps {
            if frames.len() >= request.max_frames {
                break;
            }

            let map_info = lookup.find(pc);
            let unmapped = map_info.is_none();
            if request.records(step, map_info.as_deref()) {
                frames.push(build_frame(frames.len(), pc, sp, step > 0, map_info, request));
            }

            if unmapped {
                trace!("pc 0x{pc:x} is outside every mapping, stopping");
                break;
            }
            if !chain_ok {
                break;
            }

            let Some((next_fp, return_address)) = Self::read_record(fp, &mut lookup) else {
                trace!("No readable frame record at 0x{fp:x}, stopping");
                break;
            };
            if return_address == 0 {
                break;
            }

            // The caller's frame is still reported even when its own record
            // is unusable; the walk just ends after it.
            chain_ok = next_fp > fp;
            pc = return_address;
            sp = fp + 2 * WORD_SIZE;
            fp = next_fp;
        }

        frames
    }
}
