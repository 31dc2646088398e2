//! One unwound stack frame

use std::sync::Arc;

use crate::maps::MapInfo;

/// A stack frame as produced by an [`Unwinder`](super::Unwinder)
///
/// `map_info` is `None` when `pc` lies outside every known mapping; in that
/// case `rel_pc == pc`. An empty `function_name` means no symbol was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameData {
    /// Position in the unwound sequence, innermost first
    pub num: usize,
    pub pc: u64,
    /// `pc` relative to the owning module's load base
    pub rel_pc: u64,
    pub sp: u64,
    pub map_info: Option<Arc<MapInfo>>,
    /// Raw linker symbol, demangled only when rendered
    pub function_name: String,
    pub function_offset: u64,
}

impl FrameData {
    /// Name of the owning mapping, if the frame has one
    #[must_use]
    pub fn map_name(&self) -> Option<&str> {
        self.map_info.as_deref().map(|m| m.name.as_str())
    }

    /// File offset of the owning mapping (zero when unknown)
    #[must_use]
    pub fn map_offset(&self) -> u64 {
        self.map_info.as_ref().map_or(0, |m| m.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maps::MapFlags;

    #[test]
    fn test_unknown_frame_accessors() {
        let frame = FrameData { pc: 0x1000, rel_pc: 0x1000, ..FrameData::default() };
        assert_eq!(frame.map_name(), None);
        assert_eq!(frame.map_offset(), 0);
    }

    #[test]
    fn test_mapped_frame_accessors() {
        let map = MapInfo {
            start: 0x2000,
            end: 0x3000,
            offset: 0x1000,
            flags: MapFlags::from_perms("r-xp"),
            name: "/lib/libbar.so".to_string(),
        };
        let frame = FrameData { map_info: Some(Arc::new(map)), ..FrameData::default() };
        assert_eq!(frame.map_name(), Some("/lib/libbar.so"));
        assert_eq!(frame.map_offset(), 0x1000);
    }
}
