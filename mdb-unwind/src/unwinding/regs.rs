//! Register snapshot of the calling thread

#![allow(unsafe_code)] // reading pc/sp/fp/lr requires inline asm

/// The registers an unwind starts from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Regs {
    pub pc: u64,
    pub sp: u64,
    pub fp: u64,
    /// Link register (x30); always 0 on x86_64
    pub lr: u64,
}

impl Regs {
    /// Snapshot the registers of the function this call is inlined into
    ///
    /// Always inlined, so `pc` and `fp` describe the caller's own frame rather
    /// than a helper's. Returns `None` on architectures without support.
    #[inline(always)]
    #[must_use]
    pub fn from_local() -> Option<Self> {
        imp::get_local()
    }
}

/// Name of the architecture this build targets, for error messages
#[must_use]
pub fn current_arch() -> &'static str {
    std::env::consts::ARCH
}

#[cfg(target_arch = "x86_64")]
mod imp {
    use super::Regs;

    #[inline(always)]
    pub fn get_local() -> Option<Regs> {
        let pc: usize;
        let sp: usize;
        let fp: usize;
        unsafe {
            core::arch::asm!(
                "lea {pc}, [rip]",
                "mov {sp}, rsp",
                "mov {fp}, rbp",
                pc = out(reg) pc,
                sp = out(reg) sp,
                fp = out(reg) fp,
                options(nomem, nostack, preserves_flags)
            );
        }
        Some(Regs { pc: pc as u64, sp: sp as u64, fp: fp as u64, lr: 0 })
    }
}

#[cfg(target_arch = "aarch64")]
mod imp {
    use super::Regs;

    #[inline(always)]
    pub fn get_local() -> Option<Regs> {
        let pc: usize;
        let sp: usize;
        let fp: usize;
        let lr: usize;
        unsafe {
            core::arch::asm!(
                "adr {pc}, .",
                "mov {sp}, sp",
                "mov {fp}, x29",
                "mov {lr}, x30",
                pc = out(reg) pc,
                sp = out(reg) sp,
                fp = out(reg) fp,
                lr = out(reg) lr,
                options(nomem, nostack, preserves_flags)
            );
        }
        Some(Regs { pc: pc as u64, sp: sp as u64, fp: fp as u64, lr: lr as u64 })
    }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
mod imp {
    use super::Regs;

    #[inline(always)]
    pub fn get_local() -> Option<Regs> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    fn test_from_local_points_into_this_function() {
        let regs = Regs::from_local().expect("supported architecture");

        assert_ne!(regs.pc, 0);
        assert_ne!(regs.sp, 0);
        // The stack grows down: our frame record sits at or above sp.
        assert!(regs.fp == 0 || regs.fp >= regs.sp);
    }

    #[test]
    fn test_current_arch_is_named() {
        assert!(!current_arch().is_empty());
    }
}
