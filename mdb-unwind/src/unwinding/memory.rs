//! Reading the memory of the current process
//!
//! Stack walking reads words at addresses taken from a possibly corrupted
//! frame chain, or from maps that went stale since the last parse. Reads go
//! through `process_vm_readv` so a bad address fails with `EFAULT` instead of
//! faulting the process.

#![allow(unsafe_code)] // process_vm_readv

use log::warn;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const PAGE_SIZE: usize = 4096;
const WORD_SIZE: usize = std::mem::size_of::<usize>();

/// Byte-level access to an address space
///
/// Implementations must not allocate on the read path: captures may run while
/// the instrumented allocator is in an inconsistent state.
pub trait ProcessMemory: Send + Sync {
    /// Copy up to `dst.len()` bytes from `addr`, returning the count copied
    fn read(&self, addr: u64, dst: &mut [u8]) -> usize;

    /// Read one pointer-sized word
    fn read_word(&self, addr: u64) -> Option<u64> {
        let mut buf = [0u8; WORD_SIZE];
        if self.read(addr, &mut buf) != WORD_SIZE {
            return None;
        }
        Some(usize::from_ne_bytes(buf) as u64)
    }

    /// Drop cached contents; called before every unwind
    fn clear_cache(&self) {}
}

/// Reads the caller's own address space through `process_vm_readv`
///
/// Never dereferences a caller-supplied address. When the kernel refuses the
/// syscall (seccomp, old kernels) every read returns 0 and captures fail with
/// an empty unwind.
#[derive(Debug, Default)]
pub struct LocalProcessMemory {
    refused: AtomicBool,
}

impl LocalProcessMemory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProcessMemory for LocalProcessMemory {
    fn read(&self, addr: u64, dst: &mut [u8]) -> usize {
        if dst.is_empty() || addr == 0 || self.refused.load(Ordering::Relaxed) {
            return 0;
        }
        let local = libc::iovec { iov_base: dst.as_mut_ptr().cast(), iov_len: dst.len() };
        let remote = libc::iovec { iov_base: addr as usize as *mut libc::c_void, iov_len: dst.len() };
        // Only `dst` is written; the remote range is validated by the kernel.
        let n = unsafe { libc::process_vm_readv(libc::getpid(), &local, 1, &remote, 1, 0) };
        if n >= 0 {
            return n as usize;
        }
        let errno = std::io::Error::last_os_error().raw_os_error();
        if matches!(errno, Some(libc::EPERM | libc::ENOSYS)) && !self.refused.swap(true, Ordering::Relaxed) {
            warn!("process_vm_readv unavailable ({errno:?}); backtraces will be empty");
        }
        0
    }
}

/// One page of memory cached per thread
struct PageCache {
    owner: usize,
    page: u64,
    valid: bool,
    data: [u8; PAGE_SIZE],
}

impl PageCache {
    const EMPTY: PageCache = PageCache { owner: 0, page: 0, valid: false, data: [0; PAGE_SIZE] };
}

thread_local! {
    static PAGE_CACHE: RefCell<PageCache> = const { RefCell::new(PageCache::EMPTY) };
}

/// Wraps another reader with a per-thread single-page cache
///
/// A frame-pointer walk reads two adjacent words per frame, mostly from the
/// same few stack pages. The cache is thread-local, so concurrent unwinds
/// never share or contend on it.
pub struct ThreadCachedMemory {
    inner: Arc<dyn ProcessMemory>,
}

impl ThreadCachedMemory {
    pub fn new(inner: Arc<dyn ProcessMemory>) -> Self {
        Self { inner }
    }

    fn id(&self) -> usize {
        std::ptr::from_ref(self) as usize
    }
}

impl ProcessMemory for ThreadCachedMemory {
    fn read(&self, addr: u64, dst: &mut [u8]) -> usize {
        let page = addr & !(PAGE_SIZE as u64 - 1);
        let in_page = (addr - page) as usize;
        if dst.len() > PAGE_SIZE - in_page {
            return self.inner.read(addr, dst);
        }

        let id = self.id();
        let cached = PAGE_CACHE.try_with(|cache| {
            let Ok(mut cache) = cache.try_borrow_mut() else {
                return false;
            };
            if !(cache.valid && cache.owner == id && cache.page == page) {
                cache.valid = false;
                if self.inner.read(page, &mut cache.data) != PAGE_SIZE {
                    return false;
                }
                cache.owner = id;
                cache.page = page;
                cache.valid = true;
            }
            dst.copy_from_slice(&cache.data[in_page..in_page + dst.len()]);
            true
        });

        if matches!(cached, Ok(true)) {
            dst.len()
        } else {
            self.inner.read(addr, dst)
        }
    }

    fn clear_cache(&self) {
        let _ = PAGE_CACHE.try_with(|cache| {
            if let Ok(mut cache) = cache.try_borrow_mut() {
                cache.valid = false;
            }
        });
        self.inner.clear_cache();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Serves reads from a fixed buffer mapped at `base`
    struct FakeMemory {
        base: u64,
        bytes: Vec<u8>,
        reads: AtomicUsize,
    }

    impl ProcessMemory for FakeMemory {
        fn read(&self, addr: u64, dst: &mut [u8]) -> usize {
            self.reads.fetch_add(1, Ordering::Relaxed);
            let Some(start) = addr.checked_sub(self.base) else { return 0 };
            let start = start as usize;
            if start >= self.bytes.len() {
                return 0;
            }
            let n = dst.len().min(self.bytes.len() - start);
            dst[..n].copy_from_slice(&self.bytes[start..start + n]);
            n
        }
    }

    fn fake(base: u64, len: usize) -> Arc<FakeMemory> {
        let bytes = (0..len).map(|i| (i % 251) as u8).collect();
        Arc::new(FakeMemory { base, bytes, reads: AtomicUsize::new(0) })
    }

    #[test]
    fn test_local_read_word() {
        let value: usize = 0x1122_3344;
        let memory = LocalProcessMemory::new();
        let addr = std::ptr::from_ref(&value) as usize as u64;
        assert_eq!(memory.read_word(addr), Some(0x1122_3344));
    }

    #[test]
    fn test_local_read_null_fails() {
        let memory = LocalProcessMemory::new();
        let mut buf = [0u8; 8];
        assert_eq!(memory.read(0, &mut buf), 0);
        assert_eq!(memory.read_word(0), None);
    }

    #[test]
    fn test_local_read_unmapped_page_fails() {
        let memory = LocalProcessMemory::new();
        let page = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                PAGE_SIZE,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        assert_ne!(page, libc::MAP_FAILED);
        let addr = page as usize as u64;
        unsafe { page.cast::<usize>().write(0x5a5a) };
        assert_eq!(memory.read_word(addr), Some(0x5a5a));

        // The region is gone, as if a library were unloaded after the last parse.
        assert_eq!(unsafe { libc::munmap(page, PAGE_SIZE) }, 0);
        let mut buf = [0u8; 16];
        assert_eq!(memory.read(addr, &mut buf), 0);
        assert_eq!(memory.read_word(addr), None);
        assert_eq!(memory.read(0xdead_0000, &mut buf), 0);
    }

    #[test]
    fn test_cached_read_hits_page_once() {
        let inner = fake(0x10000, 2 * PAGE_SIZE);
        let memory = ThreadCachedMemory::new(inner.clone());
        memory.clear_cache();

        let mut a = [0u8; 8];
        let mut b = [0u8; 8];
        assert_eq!(memory.read(0x10010, &mut a), 8);
        assert_eq!(memory.read(0x10100, &mut b), 8);
        assert_eq!(inner.reads.load(Ordering::Relaxed), 1);
        assert_eq!(a[0], 0x10);
        assert_eq!(b[0], (0x100 % 251) as u8);
    }

    #[test]
    fn test_cached_read_spanning_pages_goes_direct() {
        let inner = fake(0x10000, 2 * PAGE_SIZE);
        let memory = ThreadCachedMemory::new(inner.clone());
        memory.clear_cache();

        let mut buf = [0u8; 16];
        let addr = 0x10000 + PAGE_SIZE as u64 - 8;
        assert_eq!(memory.read(addr, &mut buf), 16);
        assert_eq!(buf[8], (PAGE_SIZE % 251) as u8);
    }

    #[test]
    fn test_clear_cache_forces_reload() {
        let inner = fake(0x10000, PAGE_SIZE);
        let memory = ThreadCachedMemory::new(inner.clone());
        memory.clear_cache();

        let mut buf = [0u8; 4];
        memory.read(0x10000, &mut buf);
        memory.clear_cache();
        memory.read(0x10000, &mut buf);
        assert_eq!(inner.reads.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_unreadable_page_falls_back() {
        let inner = fake(0x10000, 16);
        let memory = ThreadCachedMemory::new(inner.clone());
        memory.clear_cache();

        // Partial page: cache fill fails, direct read still serves the bytes.
        let mut expected = [0u8; WORD_SIZE];
        for (i, byte) in expected.iter_mut().enumerate() {
            *byte = i as u8;
        }
        assert_eq!(memory.read_word(0x10000), Some(usize::from_ne_bytes(expected) as u64));
        assert_eq!(memory.read_word(0x20000), None);
    }
}
