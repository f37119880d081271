//! The remote producer: keeps the sources hot and dirty in another core's cache.
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread,
};

use anyhow::{anyhow, Context, Result};

use crate::{arch, harness::Shared, workload::Packet, CACHELINE};

/// Increment the first word of every cache line of every source payload.
///
/// # Safety
/// No other thread may access the source buffers while this runs.
pub unsafe fn touch_sources(packets: &[Packet]) {
    for p in packets {
        let base = p.src().as_ptr();
        for offset in (0..p.len()).step_by(CACHELINE) {
            // Buffers are whole cache lines, so the word is in bounds.
            let word = base.add(offset) as *mut u64;
            word.write_volatile(word.read_volatile().wrapping_add(1));
        }
    }
}

/// Wait for the trigger, touch all sources, disarm; until `stop` is raised.
pub fn serve(shared: &Shared) {
    loop {
        while !shared.trigger.load(Ordering::Acquire) {
            if shared.stop.load(Ordering::Relaxed) {
                return;
            }
            arch::spin();
        }
        // SAFETY: while the trigger is armed the main thread does not touch
        // the buffers.
        unsafe { touch_sources(shared.workload.packets()) };
        arch::store_fence();
        shared.trigger.store(false, Ordering::Release);
    }
}

/// Start the remote thread, pinned to `cpu` when given.
///
/// Returns once the thread is pinned, so that a pinning failure is reported
/// to the caller.
pub fn spawn(shared: Arc<Shared>, cpu: Option<usize>) -> Result<thread::JoinHandle<()>> {
    let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);
    let handle = thread::Builder::new()
        .name("remote".into())
        .spawn(move || {
            let pinned = cpu.map_or(Ok(()), arch::pin_current_thread);
            let ok = pinned.is_ok();
            let _ = ready_tx.send(pinned);
            if !ok {
                return;
            }
            arch::print_placement("remote");
            serve(&shared);
        })
        .context("can't create thread")?;
    ready_rx
        .recv()
        .map_err(|_| anyhow!("remote thread exited during setup"))?
        .context("pinning remote thread")?;
    Ok(handle)
}

/// Wait for the remote thread, turning a panic into an error.
pub fn join(handle: thread::JoinHandle<()>) -> Result<()> {
    handle.join().map_err(|payload| {
        let msg = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("unknown cause");
        anyhow!("remote thread panicked: {msg}")
    })
}

/// Raise the stop flag and wait for the remote thread.
pub fn stop(stop: &AtomicBool, handle: thread::JoinHandle<()>) -> Result<()> {
    stop.store(true, Ordering::Relaxed);
    join(handle)
}
