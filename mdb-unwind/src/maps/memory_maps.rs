//! Memory map parsing for the current process
//!
//! Parses `/proc/self/maps` into a sorted list of [`MapInfo`] entries and
//! answers "which mapping owns this address" during an unwind.

use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use super::map_info::{MapFlags, MapInfo};
use crate::domain::MapsError;

/// Maps file of the calling process
pub const LOCAL_MAPS_PATH: &str = "/proc/self/maps";

/// Read access to the loaded segments of an address space
///
/// Implementations must be safe to query from several unwinding threads at
/// once. `find` must not allocate through the instrumented allocator.
pub trait Maps: Send + Sync {
    /// Load the mapping list, returning the number of entries
    ///
    /// # Errors
    /// Returns an error if the source cannot be read or contains no mappings
    fn parse(&self) -> Result<usize, MapsError>;

    /// Mapping containing `addr`, if any
    fn find(&self, addr: u64) -> Option<Arc<MapInfo>>;

    /// Re-read the source after the address space changed
    ///
    /// Returns `Ok(true)` if the mapping list was replaced. Sources that
    /// cannot change keep the default.
    ///
    /// # Errors
    /// Returns an error if the source could not be re-read
    fn reparse(&self) -> Result<bool, MapsError> {
        Ok(false)
    }

    /// Number of mappings currently loaded
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parse one line: "start-end perms offset dev inode pathname"
///
/// Returns `None` for malformed lines. The pathname may contain spaces and is
/// taken verbatim up to the end of the line.
#[must_use]
pub fn parse_maps_line(line: &str) -> Option<MapInfo> {
    let mut rest = line;
    let range = next_field(&mut rest)?;
    let perms = next_field(&mut rest)?;
    let offset = next_field(&mut rest)?;
    let _dev = next_field(&mut rest)?;
    let _inode = next_field(&mut rest)?;

    let (start, end) = range.split_once('-')?;
    let start = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;
    if end < start {
        return None;
    }
    let offset = u64::from_str_radix(offset, 16).ok()?;

    Some(MapInfo {
        start,
        end,
        offset,
        flags: MapFlags::from_perms(perms),
        name: rest.trim().to_string(),
    })
}

fn next_field<'a>(rest: &mut &'a str) -> Option<&'a str> {
    let trimmed = rest.trim_start();
    if trimmed.is_empty() {
        return None;
    }
    let end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
    let (field, tail) = trimmed.split_at(end);
    *rest = tail;
    Some(field)
}

/// Parse a whole maps file into entries sorted by start address
///
/// # Errors
/// Returns an error on the first malformed non-blank line
pub fn parse_maps(content: &str) -> Result<Vec<Arc<MapInfo>>, MapsError> {
    let mut maps = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let info = parse_maps_line(line)
            .ok_or_else(|| MapsError::Parse { line_no: idx + 1, line: line.to_string() })?;
        maps.push(Arc::new(info));
    }
    maps.sort_by_key(|m| m.start);
    Ok(maps)
}

/// Binary search over a sorted mapping list
fn find_in(maps: &[Arc<MapInfo>], addr: u64) -> Option<Arc<MapInfo>> {
    let idx = maps.partition_point(|m| m.end <= addr);
    maps.get(idx).filter(|m| m.contains(addr)).cloned()
}

/// Maps backed by a procfs file that can be re-read while the process runs
///
/// [`ProcMaps::local`] reads the caller's own `/proc/self/maps`; libraries
/// loaded after the first parse are picked up by [`Maps::reparse`].
#[derive(Debug)]
pub struct ProcMaps {
    path: PathBuf,
    maps: RwLock<Vec<Arc<MapInfo>>>,
}

impl ProcMaps {
    /// Maps of the current process
    #[must_use]
    pub fn local() -> Self {
        Self::from_path(LOCAL_MAPS_PATH)
    }

    /// Maps read from an arbitrary file in `/proc/<pid>/maps` format
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf(), maps: RwLock::new(Vec::new()) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<Arc<MapInfo>>, MapsError> {
        let content = fs::read_to_string(&self.path)
            .map_err(|source| MapsError::Read { path: self.path.clone(), source })?;
        let maps = parse_maps(&content)?;
        if maps.is_empty() {
            return Err(MapsError::Empty { path: self.path.clone() });
        }
        Ok(maps)
    }
}

impl Maps for ProcMaps {
    fn parse(&self) -> Result<usize, MapsError> {
        let maps = self.load()?;
        let count = maps.len();
        info!("Parsed {count} mappings from {}", self.path.display());
        *self.maps.write().unwrap_or_else(PoisonError::into_inner) = maps;
        Ok(count)
    }

    fn find(&self, addr: u64) -> Option<Arc<MapInfo>> {
        find_in(&self.maps.read().unwrap_or_else(PoisonError::into_inner), addr)
    }

    fn reparse(&self) -> Result<bool, MapsError> {
        let fresh = self.load()?;
        let mut maps = self.maps.write().unwrap_or_else(PoisonError::into_inner);
        let changed = maps.len() != fresh.len()
            || maps.iter().zip(&fresh).any(|(old, new)| **old != **new);
        if changed {
            debug!("Reparsed {}: {} -> {} mappings", self.path.display(), maps.len(), fresh.len());
            // Keep the existing Arc for entries that did not move so frames
            // captured earlier still compare equal.
            let merged = fresh
                .into_iter()
                .map(|new| find_in(&maps, new.start).filter(|old| **old == *new).unwrap_or(new))
                .collect();
            *maps = merged;
        }
        Ok(changed)
    }

    fn len(&self) -> usize {
        self.maps.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Maps parsed from an in-memory buffer
///
/// Used where the maps text is already at hand, e.g. a snapshot taken by a
/// crash handler, and by tests.
#[derive(Debug)]
pub struct BufferMaps {
    buffer: String,
    maps: RwLock<Vec<Arc<MapInfo>>>,
}

impl BufferMaps {
    pub fn new(buffer: impl Into<String>) -> Self {
        Self { buffer: buffer.into(), maps: RwLock::new(Vec::new()) }
    }
}

impl Maps for BufferMaps {
    fn parse(&self) -> Result<usize, MapsError> {
        let maps = parse_maps(&self.buffer)?;
        if maps.is_empty() {
            return Err(MapsError::Empty { path: PathBuf::from("<buffer>") });
        }
        let count = maps.len();
        *self.maps.write().unwrap_or_else(PoisonError::into_inner) = maps;
        Ok(count)
    }

    fn find(&self, addr: u64) -> Option<Arc<MapInfo>> {
        find_in(&self.maps.read().unwrap_or_else(PoisonError::into_inner), addr)
    }

    fn len(&self) -> usize {
        self.maps.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
