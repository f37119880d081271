//! Synthetic packets sized after a traffic mix.
use anyhow::Result;
use rand::Rng;

use crate::{
    alloc::{LockedBuf, MemLock},
    CACHELINE,
};

/// Typical imix profile: mostly small frames, some medium and an occasional
/// full-size one.
pub const IMIX: [usize; 12] = [64, 1518, 64, 512, 64, 64, 512, 64, 64, 512, 64, 512];

/// Buffers get `0..MAX_PAD_LINES` cache lines of padding.
pub const MAX_PAD_LINES: usize = 128;

/// Number of cache lines covering `len` bytes.
pub fn cachelines(len: usize) -> usize {
    len.div_ceil(CACHELINE)
}

/// One packet to copy: `len` bytes from `src` into `dst`.
pub struct Packet {
    src: LockedBuf,
    dst: LockedBuf,
    len: usize,
}

#[allow(clippy::len_without_is_empty)]
impl Packet {
    /// Allocate source and destination with `src_pad` and `dst_pad` extra
    /// cache lines behind the payload.
    pub fn new(len: usize, src_pad: usize, dst_pad: usize, lock: MemLock) -> Result<Self> {
        Ok(Self {
            dst: LockedBuf::new(len + CACHELINE * dst_pad, lock)?,
            src: LockedBuf::new(len + CACHELINE * src_pad, lock)?,
            len,
        })
    }

    /// Payload length in bytes.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn src(&self) -> &LockedBuf {
        &self.src
    }

    #[inline(always)]
    pub fn dst(&self) -> &LockedBuf {
        &self.dst
    }
}

/// All packets of one measurement, plus their totals.
pub struct Workload {
    packets: Vec<Packet>,
    n_cachelines: usize,
    total_bytes: usize,
}

impl Workload {
    /// Cycle through `mix` for `n` packets. Each buffer gets `0..max_pad`
    /// random cache lines of padding, so that neighbouring packets do not
    /// all start at the same cache set offset.
    pub fn generate(
        n: usize,
        mix: &[usize],
        max_pad: usize,
        lock: MemLock,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        assert!(!mix.is_empty(), "traffic mix must not be empty");
        assert!(max_pad > 0, "padding range must not be empty");
        let packets = mix
            .iter()
            .cycle()
            .take(n)
            .map(|&len| {
                let dst_pad = rng.gen_range(0..max_pad);
                let src_pad = rng.gen_range(0..max_pad);
                Packet::new(len, src_pad, dst_pad, lock)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_packets(packets))
    }

    pub fn from_packets(packets: Vec<Packet>) -> Self {
        let n_cachelines = packets.iter().map(|p| cachelines(p.len())).sum();
        let total_bytes = packets.iter().map(|p| p.len()).sum();
        Self {
            packets,
            n_cachelines,
            total_bytes,
        }
    }

    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn n_cachelines(&self) -> usize {
        self.n_cachelines
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn print(&self) {
        eprintln!("     packets: {:>10}", self.len());
        eprintln!("  cachelines: {:>10}", self.n_cachelines);
        eprintln!("       bytes: {:>10}", self.total_bytes);
    }
}
