use std::fmt::{Display, Formatter};

use crate::{tsc::TicksPerSecond, workload::Workload};

/// Throughput of one timed copy.
#[derive(Clone, Copy, Debug)]
pub struct Report {
    pub ticks: u64,
    pub ticks_per_packet: f64,
    pub ticks_per_cacheline: f64,
    /// Bits copied per second, from the calibrated tick rate.
    pub bps: f64,
}

impl Report {
    pub fn new(ticks: u64, workload: &Workload, tps: TicksPerSecond) -> Self {
        let t = ticks.max(1) as f64;
        Self {
            ticks,
            ticks_per_packet: t / workload.len().max(1) as f64,
            ticks_per_cacheline: t / workload.n_cachelines().max(1) as f64,
            bps: (workload.total_bytes() * 8) as f64 * tps.0 as f64 / t,
        }
    }

    pub fn gbps(&self) -> f64 {
        self.bps * 1e-9
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ticks, {:.2} ticks/packet, {:.2} ticks/cacheline, {:.2} Gb/s",
            self.ticks,
            self.ticks_per_packet,
            self.ticks_per_cacheline,
            self.gbps()
        )
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::{alloc::MemLock, workload::IMIX};

    #[test]
    fn imix_12() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let w = Workload::generate(12, &IMIX, 1, MemLock::Skip, &mut rng).unwrap();
        let r = Report::new(6300, &w, TicksPerSecond(3_000_000_000));
        assert_eq!(r.ticks_per_packet, 525.0);
        assert_eq!(r.ticks_per_cacheline, 100.0);
        // 4014 bytes in 2.1 us.
        let expected = 4014.0 * 8.0 * 3e9 / 6300.0;
        assert!((r.bps - expected).abs() < 1e-3);
        assert_eq!(
            r.to_string(),
            "6300 ticks, 525.00 ticks/packet, 100.00 ticks/cacheline, 15.29 Gb/s"
        );
    }

    #[test]
    fn zero_ticks_is_finite() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let w = Workload::generate(1, &IMIX, 1, MemLock::Skip, &mut rng).unwrap();
        let r = Report::new(0, &w, TicksPerSecond(1_000_000_000));
        assert!(r.bps.is_finite());
    }
}
