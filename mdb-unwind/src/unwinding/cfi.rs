//! Unwinding with the call frame information in `.eh_frame`
//!
//! [`CfiUnwinder`] hands each step to `framehop`, which evaluates the DWARF
//! CFI rows of the module owning the pc. This walks through code built
//! without frame pointers (libc, libstdc++, the precompiled standard library)
//! that would end a [`FramePointerUnwinder`](super::FramePointerUnwinder) walk.
//!
//! ```text
//! pc ──▶ Maps::find ──▶ module seen? ──no──▶ read .eh_frame/.eh_frame_hdr
//!                           │                  and register with framehop
//!                           ▼
//!                  framehop::unwind_frame ──▶ return address, caller regs
//! ```
//!
//! Modules are registered lazily, keyed by the start of their executable
//! mapping, the first time a walk lands in them. Where a module has no
//! usable CFI, framehop applies the frame-pointer rule for that frame.

use framehop::{ExplicitModuleSectionInfo, FrameAddress, Module, Unwinder as _};
use log::{debug, trace};
use mdb_unwind_common::MAX_UNWIND_STEPS;
use object::{Object, ObjectSection, ObjectSegment};
use std::collections::HashMap;
use std::fs;
use std::ops::Range;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use super::frame::FrameData;
use super::unwinder::{build_frame, MapLookup, UnwindRequest, Unwinder};
use crate::domain::SymbolError;
use crate::maps::MapInfo;

#[cfg(target_arch = "x86_64")]
mod arch {
    pub use framehop::x86_64::{CacheX86_64 as Cache, UnwindRegsX86_64 as UnwindRegs, UnwinderX86_64 as Native};

    use crate::unwinding::Regs;

    pub fn unwind_regs(regs: &Regs) -> UnwindRegs {
        UnwindRegs::new(regs.pc, regs.sp, regs.fp)
    }

    pub fn sp(regs: &UnwindRegs) -> u64 {
        regs.sp()
    }
}

#[cfg(target_arch = "aarch64")]
mod arch {
    pub use framehop::aarch64::{CacheAarch64 as Cache, UnwindRegsAarch64 as UnwindRegs, UnwinderAarch64 as Native};

    use crate::unwinding::Regs;

    pub fn unwind_regs(regs: &Regs) -> UnwindRegs {
        UnwindRegs::new(regs.lr, regs.sp, regs.fp)
    }

    pub fn sp(regs: &UnwindRegs) -> u64 {
        regs.sp()
    }
}

/// CFI sections of one module file, at their linked addresses
#[derive(Debug)]
pub struct ModuleUnwindInfo {
    /// Runtime address minus linked address
    pub bias: u64,
    pub text_svma: Option<Range<u64>>,
    pub got_svma: Option<Range<u64>>,
    pub eh_frame_svma: Range<u64>,
    pub eh_frame: Vec<u8>,
    pub eh_frame_hdr_svma: Range<u64>,
    pub eh_frame_hdr: Vec<u8>,
}

impl ModuleUnwindInfo {
    /// Read the CFI sections of the file backing `map`
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not an object file,
    /// or lacks `.eh_frame` / `.eh_frame_hdr`
    pub fn load(map: &MapInfo) -> Result<Self, SymbolError> {
        let path = Path::new(&map.name);
        let data = fs::read(path)
            .map_err(|source| SymbolError::Read { path: path.to_path_buf(), source })?;
        let obj = object::File::parse(&*data)
            .map_err(|source| SymbolError::Object { path: path.to_path_buf(), source })?;

        let missing = |section: &'static str| SymbolError::MissingSection { path: path.to_path_buf(), section };
        let (eh_frame_svma, eh_frame) = section(&obj, ".eh_frame").ok_or_else(|| missing(".eh_frame"))?;
        let (eh_frame_hdr_svma, eh_frame_hdr) =
            section(&obj, ".eh_frame_hdr").ok_or_else(|| missing(".eh_frame_hdr"))?;

        Ok(Self {
            bias: load_bias(&obj, map),
            text_svma: section_range(&obj, ".text"),
            got_svma: section_range(&obj, ".got"),
            eh_frame_svma,
            eh_frame,
            eh_frame_hdr_svma,
            eh_frame_hdr,
        })
    }

    fn into_module(self, map: &MapInfo) -> Module<Vec<u8>> {
        let sections = ExplicitModuleSectionInfo {
            base_svma: 0,
            text_svma: self.text_svma,
            got_svma: self.got_svma,
            eh_frame_svma: Some(self.eh_frame_svma),
            eh_frame: Some(self.eh_frame),
            eh_frame_hdr_svma: Some(self.eh_frame_hdr_svma),
            eh_frame_hdr: Some(self.eh_frame_hdr),
            ..Default::default()
        };
        Module::new(map.name.clone(), map.start..map.end, self.bias, sections)
    }
}

fn section_range(obj: &object::File<'_>, name: &str) -> Option<Range<u64>> {
    let section = obj.section_by_name(name)?;
    let start = section.address();
    Some(start..start + section.size())
}

fn section(obj: &object::File<'_>, name: &str) -> Option<(Range<u64>, Vec<u8>)> {
    let data = obj.section_by_name(name)?.data().ok()?;
    Some((section_range(obj, name)?, data.to_vec()))
}

/// Difference between where `map` sits and where its file bytes were linked
fn load_bias(obj: &object::File<'_>, map: &MapInfo) -> u64 {
    obj.segments()
        .find_map(|seg| {
            let (file_offset, file_size) = seg.file_range();
            (map.offset >= file_offset && map.offset - file_offset < file_size)
                .then(|| seg.address() + (map.offset - file_offset))
        })
        .map_or(map.start.wrapping_sub(map.offset), |vaddr| map.start.wrapping_sub(vaddr))
}

#[derive(Debug)]
struct SeenModule {
    name: String,
    registered: bool,
}

struct ModuleTable {
    unwinder: arch::Native<Vec<u8>>,
    /// Keyed by executable mapping start; failed loads included
    seen: HashMap<u64, SeenModule>,
}

/// Unwinder evaluating DWARF call frame information
///
/// Module registration takes a write lock and each step a read lock; module
/// files are read under neither.
pub struct CfiUnwinder {
    max_steps: usize,
    modules: RwLock<ModuleTable>,
}

impl Default for CfiUnwinder {
    fn default() -> Self {
        Self::new()
    }
}

impl CfiUnwinder {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_steps(MAX_UNWIND_STEPS)
    }

    /// Cap on raw frames visited, including skipped ones
    #[must_use]
    pub fn with_max_steps(max_steps: usize) -> Self {
        let table = ModuleTable { unwinder: arch::Native::new(), seen: HashMap::new() };
        Self { max_steps, modules: RwLock::new(table) }
    }

    /// Modules currently registered with CFI
    #[must_use]
    pub fn module_count(&self) -> usize {
        let table = self.modules.read().unwrap_or_else(PoisonError::into_inner);
        table.seen.values().filter(|m| m.registered).count()
    }

    fn is_current(&self, map: &MapInfo) -> bool {
        let table = self.modules.read().unwrap_or_else(PoisonError::into_inner);
        table.seen.get(&map.start).is_some_and(|m| m.name == map.name)
    }

    /// Register the module of executable mapping `map` unless already seen
    fn ensure_module(&self, map: &MapInfo) {
        if !map.flags.exec || !map.is_file_backed() || self.is_current(map) {
            return;
        }

        let loaded = match ModuleUnwindInfo::load(map) {
            Ok(info) => Some(info.into_module(map)),
            Err(e) => {
                debug!("No CFI for {}: {e}", map.name);
                None
            }
        };

        let mut table = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        if table.seen.get(&map.start).is_some_and(|m| m.name == map.name) {
            return;
        }
        // A different module now occupies this address.
        if let Some(stale) = table.seen.remove(&map.start) {
            if stale.registered {
                table.unwinder.remove_module(map.start);
            }
        }
        let registered = loaded.is_some();
        if let Some(module) = loaded {
            debug!("Registered CFI for {} at 0x{:x}", map.name, map.start);
            table.unwinder.add_module(module);
        }
        table.seen.insert(map.start, SeenModule { name: map.name.clone(), registered });
    }
}

impl Unwinder for CfiUnwinder {
    fn unwind(&self, request: &UnwindRequest<'_>) -> Vec<FrameData> {
        let mut frames = Vec::with_capacity(request.max_frames);
        let mut lookup = MapLookup::new(request);
        let mut read_stack = |addr: u64| request.memory.read_word(addr).ok_or(());

        let mut regs = arch::unwind_regs(&request.regs);
        let mut cache = arch::Cache::new();
        let mut address = FrameAddress::InstructionPointer(request.regs.pc);

        for step in 0..self.max_steps {
            if frames.len() >= request.max_frames {
                break;
            }

            let pc = address.address();
            let map_info = lookup.find(pc);
            if let Some(map) = map_info.as_deref() {
                self.ensure_module(map);
            }
            let unmapped = map_info.is_none();
            if request.records(step, map_info.as_deref()) {
                let sp = arch::sp(&regs);
                frames.push(build_frame(frames.len(), pc, sp, address.is_return_address(), map_info, request));
            }
            if unmapped {
                trace!("pc 0x{pc:x} is outside every mapping, stopping");
                break;
            }

            let next = {
                let table = self.modules.read().unwrap_or_else(PoisonError::into_inner);
                table.unwinder.unwind_frame(address, &mut regs, &mut cache, &mut read_stack)
            };
            match next {
                Ok(Some(return_address)) => match FrameAddress::from_return_address(return_address) {
                    Some(next) => address = next,
                    None => break,
                },
                Ok(None) => break,
                Err(e) => {
                    trace!("CFI step at 0x{pc:x} failed: {e}, stopping");
                    break;
                }
            }
        }

        frames
    }
}
