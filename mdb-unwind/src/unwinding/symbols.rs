//! Function-name lookup for program counters inside loaded modules
//!
//! Symbols come from the module's ELF `.symtab`, falling back to `.dynsym`
//! for stripped libraries. Each module file is parsed once and the sorted
//! symbol table is cached by path.

use log::debug;
use object::{Object, ObjectSegment, ObjectSymbol, SymbolKind};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use crate::domain::SymbolError;
use crate::maps::MapInfo;

/// Resolves the function containing a program counter
///
/// Returns the raw (possibly mangled) name and the byte offset of `pc` from
/// the start of the function. Lookups may read module files and allocate.
pub trait SymbolLookup: Send + Sync {
    fn function_name(&self, map: &MapInfo, pc: u64) -> Option<(String, u64)>;
}

/// Lookup that never resolves anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSymbols;

impl SymbolLookup for NoSymbols {
    fn function_name(&self, _map: &MapInfo, _pc: u64) -> Option<(String, u64)> {
        None
    }
}

#[derive(Debug, Clone)]
struct SymbolEntry {
    addr: u64,
    size: u64,
    name: String,
}

/// Loadable segment: where a range of file bytes lands in virtual memory
#[derive(Debug, Clone, Copy)]
struct Segment {
    file_offset: u64,
    file_size: u64,
    vaddr: u64,
}

/// Function symbols of one module, sorted by address
#[derive(Debug)]
pub struct ModuleSymbols {
    segments: Vec<Segment>,
    symbols: Vec<SymbolEntry>,
}

impl ModuleSymbols {
    /// Load the symbol table of an ELF file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a valid object
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SymbolError> {
        let path = path.as_ref();
        let data = fs::read(path)
            .map_err(|source| SymbolError::Read { path: path.to_path_buf(), source })?;
        Self::parse(&data).map_err(|source| SymbolError::Object { path: path.to_path_buf(), source })
    }

    fn parse(data: &[u8]) -> Result<Self, object::Error> {
        let obj = object::File::parse(data)?;

        let segments = obj
            .segments()
            .map(|seg| {
                let (file_offset, file_size) = seg.file_range();
                Segment { file_offset, file_size, vaddr: seg.address() }
            })
            .collect();

        let mut symbols = collect_functions(obj.symbols());
        if symbols.is_empty() {
            symbols = collect_functions(obj.dynamic_symbols());
        }
        symbols.sort_by_key(|s| s.addr);
        symbols.dedup_by_key(|s| s.addr);

        Ok(Self { segments, symbols })
    }

    /// Number of function symbols
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Translate a file offset into the module's virtual address space
    fn vaddr_for_file_offset(&self, file_offset: u64) -> u64 {
        self.segments
            .iter()
            .find(|seg| file_offset >= seg.file_offset && file_offset - seg.file_offset < seg.file_size)
            .map_or(file_offset, |seg| seg.vaddr + (file_offset - seg.file_offset))
    }

    /// Find the function containing a module virtual address
    fn lookup(&self, vaddr: u64) -> Option<(&str, u64)> {
        let idx = self.symbols.partition_point(|s| s.addr <= vaddr).checked_sub(1)?;
        let sym = &self.symbols[idx];
        let offset = vaddr - sym.addr;
        // Zero-sized symbols (hand-written asm) cover up to the next symbol.
        if sym.size != 0 && offset >= sym.size {
            return None;
        }
        Some((sym.name.as_str(), offset))
    }

    /// Resolve an absolute `pc` inside `map`
    #[must_use]
    pub fn resolve(&self, map: &MapInfo, pc: u64) -> Option<(String, u64)> {
        let file_offset = pc.checked_sub(map.start)? + map.offset;
        let vaddr = self.vaddr_for_file_offset(file_offset);
        self.lookup(vaddr).map(|(name, offset)| (name.to_string(), offset))
    }
}

fn collect_functions<'data, I, S>(symbols: I) -> Vec<SymbolEntry>
where
    I: Iterator<Item = S>,
    S: ObjectSymbol<'data>,
{
    symbols
        .filter(|sym| sym.kind() == SymbolKind::Text && sym.is_definition() && sym.address() != 0)
        .filter_map(|sym| {
            let name = sym.name().ok().filter(|n| !n.is_empty())?;
            Some(SymbolEntry { addr: sym.address(), size: sym.size(), name: name.to_string() })
        })
        .collect()
}

/// Symbol tables of every module seen so far, keyed by path
///
/// Modules that fail to load are remembered as `None` so the file is not
/// re-read on every frame.
#[derive(Debug, Default)]
pub struct ElfSymbolCache {
    modules: Mutex<HashMap<String, Option<Arc<ModuleSymbols>>>>,
}

impl ElfSymbolCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn module(&self, path: &str) -> Option<Arc<ModuleSymbols>> {
        if let Some(cached) = self.modules.lock().unwrap_or_else(PoisonError::into_inner).get(path) {
            return cached.clone();
        }

        // Read and parse without the lock; a racing loader of the same path
        // loses and its copy is dropped.
        let loaded = match ModuleSymbols::load(path) {
            Ok(symbols) => {
                debug!("Loaded {} function symbols from {path}", symbols.len());
                Some(Arc::new(symbols))
            }
            Err(e) => {
                debug!("No symbols for {path}: {e}");
                None
            }
        };

        let mut modules = self.modules.lock().unwrap_or_else(PoisonError::into_inner);
        modules.entry(path.to_string()).or_insert(loaded).clone()
    }
}

impl SymbolLookup for ElfSymbolCache {
    fn function_name(&self, map: &MapInfo, pc: u64) -> Option<(String, u64)> {
        if !map.is_file_backed() {
            return None;
        }
        self.module(&map.name)?.resolve(map, pc)
    }
}
