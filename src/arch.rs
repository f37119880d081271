//! Performance primitives: cycle counter, prefetch, fences and CPU placement.
//!
//! Everything platform specific lives here so the copy loop and the
//! measurement protocol can be written once.
use anyhow::{bail, Result};

/// Read the timestamp counter.
#[inline(always)]
pub fn rdtsc() -> u64 {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        std::arch::x86_64::_rdtsc()
    }
    #[cfg(target_arch = "x86")]
    unsafe {
        std::arch::x86::_rdtsc()
    }
    #[cfg(target_arch = "aarch64")]
    {
        let t: u64;
        unsafe { std::arch::asm!("mrs {}, cntvct_el0", out(reg) t, options(nomem, nostack)) };
        t
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "x86", target_arch = "aarch64")))]
    {
        use std::{sync::OnceLock, time::Instant};
        static EPOCH: OnceLock<Instant> = OnceLock::new();
        EPOCH.get_or_init(Instant::now).elapsed().as_nanos() as u64
    }
}

/// Prefetch the cacheline containing `ptr` into L1 cache.
///
/// This is only a hint: `ptr` is never dereferenced, so it does not need to
/// point to valid memory.
#[inline(always)]
pub fn prefetch(ptr: *const u8) {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        std::arch::x86_64::_mm_prefetch(ptr as *const i8, std::arch::x86_64::_MM_HINT_T0);
    }
    #[cfg(target_arch = "x86")]
    unsafe {
        std::arch::x86::_mm_prefetch(ptr as *const i8, std::arch::x86::_MM_HINT_T0);
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "x86")))]
    {
        // Do nothing.
        let _ = ptr;
    }
}

/// Make all previous stores globally visible before any later store.
#[inline(always)]
pub fn store_fence() {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        std::arch::x86_64::_mm_sfence();
    }
    #[cfg(target_arch = "x86")]
    unsafe {
        std::arch::x86::_mm_sfence();
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "x86")))]
    std::sync::atomic::fence(std::sync::atomic::Ordering::Release);
}

/// Busy-wait hint (PAUSE on x86).
#[inline(always)]
pub fn spin() {
    std::hint::spin_loop();
}

/// The logical CPU and NUMA node the calling thread currently runs on.
pub fn current_cpu() -> Option<(u32, u32)> {
    #[cfg(target_os = "linux")]
    {
        let mut cpu: libc::c_uint = 0;
        let mut node: libc::c_uint = 0;
        let ret = unsafe {
            libc::syscall(
                libc::SYS_getcpu,
                &mut cpu as *mut libc::c_uint,
                &mut node as *mut libc::c_uint,
                std::ptr::null_mut::<libc::c_void>(),
            )
        };
        (ret == 0).then_some((cpu, node))
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Pin the calling thread to the given logical CPU.
pub fn pin_current_thread(cpu: usize) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        if cpu >= libc::CPU_SETSIZE as usize {
            bail!("sched_setaffinity: cpu {cpu} out of range");
        }
        let ret = unsafe {
            let mut set: libc::cpu_set_t = std::mem::zeroed();
            libc::CPU_ZERO(&mut set);
            libc::CPU_SET(cpu, &mut set);
            libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
        };
        if ret == -1 {
            bail!(
                "sched_setaffinity to cpu {cpu}: {}",
                std::io::Error::last_os_error()
            );
        }
        Ok(())
    }
    #[cfg(not(target_os = "linux"))]
    {
        bail!("sched_setaffinity to cpu {cpu}: not supported on this platform")
    }
}

/// Print which cpu and node the calling thread runs on.
pub fn print_placement(name: &str) {
    match current_cpu() {
        Some((cpu, node)) => println!("{name} thread running on cpu {cpu} node {node}"),
        None => println!("{name} thread running on unknown cpu"),
    }
}
