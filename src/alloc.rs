//! Cache-line aligned buffers that are locked into physical memory.
use std::{alloc::Layout, ptr::NonNull};

use anyhow::{bail, Context, Result};

use crate::CACHELINE;

/// Whether buffers must be `mlock`ed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemLock {
    /// Locking failure is fatal. Page faults would show up in the timings.
    Required,
    /// Do not lock at all. Only for tests, which may run without privileges.
    Skip,
}

/// A zeroed, 64-byte aligned allocation, a whole number of cache lines long.
///
/// The buffer hands out raw pointers from `&self`: which thread may touch the
/// contents at any point in time is decided by the trigger protocol in
/// [`crate::harness`], not by the borrow checker.
pub struct LockedBuf {
    ptr: NonNull<u8>,
    layout: Layout,
    locked: bool,
}

// SAFETY: the buffer is plain memory; accesses from different threads are
// ordered by the trigger flag.
unsafe impl Send for LockedBuf {}
unsafe impl Sync for LockedBuf {}

#[allow(clippy::len_without_is_empty)]
impl LockedBuf {
    /// Allocate at least `size` bytes.
    pub fn new(size: usize, lock: MemLock) -> Result<Self> {
        let size = size.max(1).next_multiple_of(CACHELINE);
        let layout = Layout::from_size_align(size, CACHELINE)
            .with_context(|| format!("invalid buffer layout for {size} bytes"))?;
        let Some(ptr) = NonNull::new(unsafe { std::alloc::alloc_zeroed(layout) }) else {
            bail!("allocation of {size} bytes failed");
        };
        let mut buf = Self {
            ptr,
            layout,
            locked: false,
        };
        if lock == MemLock::Required {
            buf.lock()?;
        }
        Ok(buf)
    }

    fn lock(&mut self) -> Result<()> {
        #[cfg(unix)]
        {
            let ret = unsafe { libc::mlock(self.ptr.as_ptr() as *const libc::c_void, self.len()) };
            if ret != 0 {
                bail!(
                    "mlock failed: [{}], try with sudo",
                    std::io::Error::last_os_error()
                );
            }
            self.locked = true;
            Ok(())
        }
        #[cfg(not(unix))]
        {
            bail!("mlock failed: not supported on this platform")
        }
    }

    /// The allocated size in bytes, always a multiple of [`CACHELINE`].
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// View the contents.
    ///
    /// # Safety
    /// No other thread may write the buffer while the slice is alive.
    pub unsafe fn as_slice(&self) -> &[u8] {
        std::slice::from_raw_parts(self.as_ptr(), self.len())
    }

    /// Mutable view of the contents.
    ///
    /// # Safety
    /// No other thread may access the buffer while the slice is alive.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn as_mut_slice(&self) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.as_ptr(), self.len())
    }
}

impl Drop for LockedBuf {
    fn drop(&mut self) {
        // No munlock: small buffers share pages with live neighbours, and
        // mlock does not count. Locked pages are released at process exit.
        unsafe { std::alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_and_rounded() {
        for size in [0, 1, 63, 64, 65, 1518, 1518 + 64 * 127] {
            let buf = LockedBuf::new(size, MemLock::Skip).unwrap();
            assert_eq!(buf.as_ptr() as usize % CACHELINE, 0);
            assert_eq!(buf.len() % CACHELINE, 0);
            assert!(buf.len() >= size);
            assert!(!buf.is_locked());
            assert!(unsafe { buf.as_slice() }.iter().all(|&b| b == 0));
        }
    }

    /// Locked memory of this process, in kB.
    #[cfg(target_os = "linux")]
    fn vm_locked_kb() -> Option<usize> {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        let line = status.lines().find(|l| l.starts_with("VmLck:"))?;
        line.split_whitespace().nth(1)?.parse().ok()
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn drop_keeps_neighbours_locked() {
        // Two small buffers, most likely on the same page.
        let (Ok(a), Ok(b)) = (
            LockedBuf::new(64, MemLock::Required),
            LockedBuf::new(64, MemLock::Required),
        ) else {
            // Not allowed to lock at all here.
            return;
        };
        let Some(before) = vm_locked_kb() else { return };
        drop(a);
        assert!(b.is_locked());
        // Other tests only ever add locked pages.
        assert!(vm_locked_kb().is_some_and(|after| after >= before));
    }

    #[test]
    fn lock_small_buffer() {
        // A single page is below any sane RLIMIT_MEMLOCK, but an unprivileged
        // sandbox may still refuse; then the error must name mlock.
        match LockedBuf::new(4096, MemLock::Required) {
            Ok(buf) => assert!(buf.is_locked()),
            Err(err) => assert!(err.to_string().contains("mlock failed")),
        }
    }
}
