// String formatting intentionally uses format! for clarity
#![allow(clippy::format_push_string)]

use mdb_unwind_common::{ANONYMOUS_PREFIX, POINTER_HEX_WIDTH, UNKNOWN_LOCATION};

use super::demangle::{Demangler, SymbolDemangler};
use super::sink::LogSink;
use crate::unwinding::FrameData;

/// Renders frames as one-line-per-frame diagnostic text
///
/// ```text
/// #0  pc 0000000000012345  /system/lib64/libc.so (malloc+24)
/// #1  pc 0000000000003000  (offset 0x1000) /data/app/base.apk (Foo::bar()+8)
/// #2  pc 00007f0000001234  <anonymous:7f0000000000>
/// #3  pc 0000000000004000  <unknown>
/// ```
pub struct BacktraceFormatter<D = SymbolDemangler> {
    demangler: D,
}

impl Default for BacktraceFormatter<SymbolDemangler> {
    fn default() -> Self {
        Self::new(SymbolDemangler)
    }
}

impl<D: Demangler> BacktraceFormatter<D> {
    pub fn new(demangler: D) -> Self {
        Self { demangler }
    }

    /// Format the frame at position `index` of a backtrace
    #[must_use]
    pub fn format_frame(&self, index: usize, frame: &FrameData) -> String {
        let mut line = format!("#{index}  pc {:0width$x}  ", frame.rel_pc, width = POINTER_HEX_WIDTH);

        match frame.map_info.as_deref() {
            None => line.push_str(UNKNOWN_LOCATION),
            Some(map) => {
                if map.offset != 0 {
                    line.push_str(&format!("(offset 0x{:x}) ", map.offset));
                }
                if map.name.is_empty() {
                    line.push_str(&format!("{ANONYMOUS_PREFIX}{:x}>", map.start));
                } else {
                    line.push_str(&map.name);
                }
            }
        }

        if !frame.function_name.is_empty() {
            line.push_str(" (");
            match self.demangler.demangle(&frame.function_name) {
                Some(demangled) => line.push_str(&demangled),
                None => line.push_str(&frame.function_name),
            }
            if frame.function_offset != 0 {
                line.push_str(&format!("+{}", frame.function_offset));
            }
            line.push(')');
        }

        line
    }

    /// One line per frame, in input order
    pub fn render(&self, frames: &[FrameData]) -> Vec<String> {
        frames.iter().enumerate().map(|(i, frame)| self.format_frame(i, frame)).collect()
    }

    /// Emit each frame's line to `sink` as soon as it is formatted
    pub fn log(&self, frames: &[FrameData], sink: &dyn LogSink) {
        for (i, frame) in frames.iter().enumerate() {
            sink.log_line(&self.format_frame(i, frame));
        }
    }
}
