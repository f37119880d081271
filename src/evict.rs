//! Push the previous run's destinations out of the local cache.
use anyhow::Result;

use crate::{
    alloc::{LockedBuf, MemLock},
    CACHELINE,
};

/// Scratch buffer size: 256 KiB.
pub const SCRATCH_LINES: usize = 4096;
/// Random writes before each measurement.
pub const EVICT_TOUCHES: usize = 4096;

/// Random writes over a scratch buffer.
///
/// Random offsets give the hardware prefetcher no stride to lock on to.
pub struct Evictor {
    scratch: LockedBuf,
    lines: usize,
    touches: usize,
    rng: fastrand::Rng,
}

impl Evictor {
    pub fn new(lines: usize, touches: usize, lock: MemLock, seed: Option<u64>) -> Result<Self> {
        assert!(lines > 0);
        Ok(Self {
            scratch: LockedBuf::new(lines * CACHELINE, lock)?,
            lines,
            touches,
            rng: seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed),
        })
    }

    /// Increment one word in each of `touches` random cache lines.
    #[inline(never)]
    pub fn evict(&mut self) {
        let base = self.scratch.as_ptr();
        for _ in 0..self.touches {
            let line = self.rng.usize(..self.lines);
            // SAFETY: in bounds, aligned, and the scratch buffer is private.
            unsafe {
                let word = base.add(line * CACHELINE) as *mut u64;
                word.write_volatile(word.read_volatile().wrapping_add(1));
            }
        }
    }

    pub fn scratch(&self) -> &LockedBuf {
        &self.scratch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_words(e: &Evictor) -> Vec<u64> {
        let bytes = unsafe { e.scratch().as_slice() };
        bytes
            .chunks_exact(CACHELINE)
            .map(|line| u64::from_ne_bytes(line[..8].try_into().unwrap()))
            .collect()
    }

    #[test]
    fn touches_add_up() {
        let mut e = Evictor::new(SCRATCH_LINES, EVICT_TOUCHES, MemLock::Skip, Some(7)).unwrap();
        assert_eq!(e.scratch().len(), 4096 * 64);
        e.evict();
        e.evict();
        let words = line_words(&e);
        assert_eq!(words.iter().sum::<u64>(), 2 * 4096);
        // Spread over many lines, not a fixed few.
        assert!(words.iter().filter(|&&w| w > 0).count() > 2048);
    }

    #[test]
    fn only_first_word_of_each_line() {
        let mut e = Evictor::new(16, 1000, MemLock::Skip, Some(1)).unwrap();
        e.evict();
        let bytes = unsafe { e.scratch().as_slice() };
        for line in bytes.chunks_exact(CACHELINE) {
            assert!(line[8..].iter().all(|&b| b == 0));
        }
    }
}
