//! The routine under test: copy a batch of packets.
use std::ptr;

use crate::{arch::prefetch, workload::Packet};

/// Prefetch the first two cache lines of the source of `packets[i]`.
///
/// Lookahead past the end of the batch is dropped, and the second line is
/// only requested when the allocation covers it.
#[inline(always)]
fn prefetch_src(packets: &[Packet], i: usize) {
    if let Some(p) = packets.get(i) {
        let src = p.src();
        prefetch(src.as_ptr());
        if src.len() > 128 {
            prefetch(src.as_ptr().wrapping_add(128));
        }
    }
}

/// Copy `len` bytes of one packet.
///
/// # Safety
/// No other thread may access the packet's buffers.
#[inline(always)]
unsafe fn copy_one(p: &Packet) {
    debug_assert!(p.len() <= p.src().len() && p.len() <= p.dst().len());
    ptr::copy_nonoverlapping(p.src().as_ptr(), p.dst().as_ptr(), p.len());
}

/// Copy the payload of every packet from its source to its destination.
///
/// Packets are processed four at a time. The sources of the next four are
/// prefetched while the current ones are copied, hiding the miss latency
/// of one group behind the copies of the previous group.
///
/// # Safety
/// While this runs, no other thread may access any of the buffers.
#[inline(never)]
pub unsafe fn copy_packets(packets: &[Packet]) {
    let mut chunks = packets.chunks_exact(4);
    let mut i = 0;
    for chunk in &mut chunks {
        prefetch_src(packets, i + 4);
        prefetch_src(packets, i + 5);

        copy_one(&chunk[0]);
        copy_one(&chunk[1]);

        prefetch_src(packets, i + 6);
        prefetch_src(packets, i + 7);

        copy_one(&chunk[2]);
        copy_one(&chunk[3]);

        i += 4;
    }

    for p in chunks.remainder() {
        copy_one(p);
    }
}
