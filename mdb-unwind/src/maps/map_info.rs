//! A single entry of the process address space

use std::fmt;

/// Permission bits of a mapping (`rwxp` column of `/proc/<pid>/maps`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapFlags {
    pub read: bool,
    pub write: bool,
    pub exec: bool,
}

impl MapFlags {
    /// Parse the permission column, e.g. `r-xp`
    #[must_use]
    pub fn from_perms(perms: &str) -> Self {
        let bytes = perms.as_bytes();
        Self {
            read: bytes.first() == Some(&b'r'),
            write: bytes.get(1) == Some(&b'w'),
            exec: bytes.get(2) == Some(&b'x'),
        }
    }
}

impl fmt::Display for MapFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = if self.read { 'r' } else { '-' };
        let w = if self.write { 'w' } else { '-' };
        let x = if self.exec { 'x' } else { '-' };
        write!(f, "{r}{w}{x}")
    }
}

/// Memory range of a loaded segment in the process's address space
///
/// `name` is empty for anonymous mappings; pseudo-mappings keep their
/// bracketed kernel name (`[stack]`, `[vdso]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapInfo {
    pub start: u64,
    pub end: u64,
    /// Offset of `start` within the backing file
    pub offset: u64,
    pub flags: MapFlags,
    pub name: String,
}

impl MapInfo {
    /// Check if an address falls within this mapping
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }

    /// Address at which file offset zero of the module would be mapped
    #[must_use]
    pub fn load_base(&self) -> u64 {
        self.start.wrapping_sub(self.offset)
    }

    /// Program counter relative to the module load base
    #[must_use]
    pub fn rel_pc(&self, pc: u64) -> u64 {
        pc.wrapping_sub(self.load_base())
    }

    /// True for mappings backed by a file on disk
    #[must_use]
    pub fn is_file_backed(&self) -> bool {
        !self.name.is_empty() && !self.name.starts_with('[')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(start: u64, end: u64, offset: u64, name: &str) -> MapInfo {
        MapInfo { start, end, offset, flags: MapFlags::from_perms("r-xp"), name: name.to_string() }
    }

    #[test]
    fn test_map_contains() {
        let info = map(0x1000, 0x2000, 0, "/lib/libfoo.so");

        assert!(info.contains(0x1000));
        assert!(info.contains(0x1FFF));
        assert!(!info.contains(0x0FFF));
        assert!(!info.contains(0x2000));
    }

    #[test]
    fn test_rel_pc_accounts_for_file_offset() {
        let info = map(0x7f00_0000_3000, 0x7f00_0000_5000, 0x2000, "/lib/libfoo.so");

        assert_eq!(info.load_base(), 0x7f00_0000_1000);
        assert_eq!(info.rel_pc(0x7f00_0000_3010), 0x2010);
    }

    #[test]
    fn test_flags_from_perms() {
        let flags = MapFlags::from_perms("rw-p");
        assert!(flags.read && flags.write && !flags.exec);
        assert_eq!(flags.to_string(), "rw-");
        assert_eq!(MapFlags::from_perms(""), MapFlags::default());
    }

    #[test]
    fn test_file_backed() {
        assert!(map(0, 1, 0, "/system/bin/app").is_file_backed());
        assert!(!map(0, 1, 0, "[stack]").is_file_backed());
        assert!(!map(0, 1, 0, "").is_file_backed());
    }
}
