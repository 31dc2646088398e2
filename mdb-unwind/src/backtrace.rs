//! Capturing the calling thread's backtrace
//!
//! [`Backtrace::capture`] and the boolean [`unwind`] entry point snapshot
//! registers in their own frame and drop that frame, so frame 0 is their
//! caller (unless deny-listed).
//!
//! [`BacktraceCapture`] bundles what a capture runs against: the context
//! guard, the unwinder and the deny-list. The entry points use the
//! process-wide ones; tests and embedders can inject their own.

use log::debug;
use std::sync::LazyLock;

use crate::config::{process_config, UnwindConfig};
use crate::context::{build_local_context, process_guard, InitGuard, ProcessUnwindContext};
use crate::domain::UnwindError;
use crate::unwinding::regs::current_arch;
use crate::unwinding::{FrameData, Regs, UnwindRequest, Unwinder};

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
type DefaultUnwinder = crate::unwinding::CfiUnwinder;
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
type DefaultUnwinder = crate::unwinding::FramePointerUnwinder;

static DEFAULT_UNWINDER: LazyLock<DefaultUnwinder> = LazyLock::new(DefaultUnwinder::default);

/// Frames of this crate between the register snapshot and the caller
const OWN_FRAMES: usize = 1;

/// Program counters paired 1:1 with their frame metadata
///
/// `frames()[i] == frame_info()[i].pc` for every `i`; a `Backtrace` is never
/// empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backtrace {
    frames: Vec<u64>,
    frame_info: Vec<FrameData>,
}

impl Backtrace {
    /// Capture at most `max_frames` frames of the calling thread
    ///
    /// Frame 0 is the function that called `capture`.
    ///
    /// # Errors
    /// - `InvalidMaxFrames` if `max_frames` is zero
    /// - `Disabled` if the process maps could not be parsed (permanent)
    /// - `UnsupportedArch` if registers cannot be read on this target
    /// - `EmptyUnwind` if every frame was filtered or unreadable
    #[inline(never)]
    pub fn capture(max_frames: usize) -> Result<Self, UnwindError> {
        BacktraceCapture::process().capture_from(Regs::from_local(), max_frames)
    }

    pub fn frames(&self) -> &[u64] {
        &self.frames
    }

    pub fn frame_info(&self) -> &[FrameData] {
        &self.frame_info
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn into_parts(self) -> (Vec<u64>, Vec<FrameData>) {
        (self.frames, self.frame_info)
    }
}

/// The collaborators one capture runs against
pub struct BacktraceCapture<'a> {
    context: &'a InitGuard<ProcessUnwindContext>,
    init: fn() -> Option<ProcessUnwindContext>,
    unwinder: &'a dyn Unwinder,
    config: &'a UnwindConfig,
    skip_frames: usize,
}

impl BacktraceCapture<'static> {
    /// Process-wide context, default unwinder and deny-list
    ///
    /// Drops the innermost frame, which belongs to the entry point that
    /// took the register snapshot.
    pub fn process() -> Self {
        Self::new(process_guard(), build_local_context, &*DEFAULT_UNWINDER, process_config())
            .skip_frames(OWN_FRAMES)
    }
}

impl<'a> BacktraceCapture<'a> {
    /// `init` builds the context the first time `context` is consulted
    pub fn new(
        context: &'a InitGuard<ProcessUnwindContext>,
        init: fn() -> Option<ProcessUnwindContext>,
        unwinder: &'a dyn Unwinder,
        config: &'a UnwindConfig,
    ) -> Self {
        Self { context, init, unwinder, config, skip_frames: 0 }
    }

    /// Drop `n` innermost raw frames before recording
    #[must_use]
    pub fn skip_frames(mut self, n: usize) -> Self {
        self.skip_frames = n;
        self
    }

    /// Unwind from a register snapshot; `None` means registers are unavailable
    ///
    /// # Errors
    /// Same as [`Backtrace::capture`]
    pub fn capture_from(&self, regs: Option<Regs>, max_frames: usize) -> Result<Backtrace, UnwindError> {
        if max_frames == 0 {
            return Err(UnwindError::InvalidMaxFrames);
        }
        let ctx = self.context.get_or_init(self.init).ok_or(UnwindError::Disabled)?;
        let regs = regs.ok_or(UnwindError::UnsupportedArch(current_arch()))?;
        run_unwind(ctx, self.unwinder, self.config, regs, max_frames, self.skip_frames)
    }

    /// Fill caller-owned vectors; `false` with both emptied on any failure
    pub fn unwind_into(
        &self,
        regs: Option<Regs>,
        frames: &mut Vec<u64>,
        frame_info: &mut Vec<FrameData>,
        max_frames: usize,
    ) -> bool {
        frames.clear();
        frame_info.clear();

        match self.capture_from(regs, max_frames) {
            Ok(backtrace) => {
                (*frames, *frame_info) = backtrace.into_parts();
                true
            }
            Err(e) => {
                debug!("Backtrace capture failed: {e}");
                false
            }
        }
    }
}

/// Run one unwind against explicit collaborators, keeping every raw frame
///
/// # Errors
/// `InvalidMaxFrames` for a zero limit, `EmptyUnwind` if no frame survives
pub fn capture_with(
    ctx: &ProcessUnwindContext,
    unwinder: &dyn Unwinder,
    config: &UnwindConfig,
    regs: Regs,
    max_frames: usize,
) -> Result<Backtrace, UnwindError> {
    run_unwind(ctx, unwinder, config, regs, max_frames, 0)
}

fn run_unwind(
    ctx: &ProcessUnwindContext,
    unwinder: &dyn Unwinder,
    config: &UnwindConfig,
    regs: Regs,
    max_frames: usize,
    skip_frames: usize,
) -> Result<Backtrace, UnwindError> {
    if max_frames == 0 {
        return Err(UnwindError::InvalidMaxFrames);
    }

    ctx.memory().clear_cache();
    let request = UnwindRequest {
        regs,
        maps: ctx.maps(),
        memory: ctx.memory(),
        symbols: ctx.symbols(),
        max_frames,
        skip_libraries: &config.skip_libraries,
        skip_frames,
    };

    let mut frame_info = unwinder.unwind(&request);
    if frame_info.is_empty() {
        return Err(UnwindError::EmptyUnwind);
    }
    frame_info.truncate(max_frames);

    let frames = frame_info.iter().map(|f| f.pc).collect();
    Ok(Backtrace { frames, frame_info })
}

/// Capture the calling thread's backtrace into caller-owned vectors
///
/// Returns `false` with both vectors empty on any failure; never panics.
#[inline(never)]
pub fn unwind(frames: &mut Vec<u64>, frame_info: &mut Vec<FrameData>, max_frames: usize) -> bool {
    BacktraceCapture::process().unwind_into(Regs::from_local(), frames, frame_info, max_frames)
}
