//! Timestamp counter calibration.
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::arch;

/// Calibration is rounded to this many ticks per second.
pub const GRANULARITY: u64 = 10_000_000;

/// A wall clock together with a cycle counter.
pub trait TimeSource {
    /// Wall time in seconds.
    fn wall_secs(&mut self) -> f64;
    /// Raw cycle counter.
    fn ticks(&mut self) -> u64;
}

/// The realtime clock and the hardware TSC.
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn wall_secs(&mut self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }

    fn ticks(&mut self) -> u64 {
        arch::rdtsc()
    }
}

/// The calibrated frequency of the cycle counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TicksPerSecond(pub u64);

impl TicksPerSecond {
    /// Busy-wait for `duration` of wall time and count ticks in between.
    pub fn calibrate(clock: &mut impl TimeSource, duration: Duration) -> Self {
        let start = clock.wall_secs();
        let end = start + duration.as_secs_f64();
        let t0 = clock.ticks();
        let mut now = start;
        while now < end {
            now = clock.wall_secs();
        }
        let t1 = clock.ticks();
        Self::from_sample(t1.wrapping_sub(t0), now - start)
    }

    /// Round `ticks / secs` to [`GRANULARITY`].
    pub fn from_sample(ticks: u64, secs: f64) -> Self {
        let rate = ticks as f64 / secs.max(f64::MIN_POSITIVE);
        let rounded = (rate / GRANULARITY as f64).round() as u64 * GRANULARITY;
        Self(rounded.max(GRANULARITY))
    }

    pub fn ghz(&self) -> f64 {
        self.0 as f64 * 1e-9
    }

    pub fn tick_ns(&self) -> f64 {
        1e9 / self.0 as f64
    }

    pub fn print(&self) {
        use colored::Colorize;
        println!(
            "{}",
            format!(
                "TSC frequency: {:.2} GHz, tick duration {:.2} ns",
                self.ghz(),
                self.tick_ns()
            )
            .bold()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every wall clock read advances time by `step` seconds; the counter runs
    /// at `hz` relative to that clock.
    struct FakeClock {
        secs: f64,
        step: f64,
        hz: f64,
    }

    impl TimeSource for FakeClock {
        fn wall_secs(&mut self) -> f64 {
            self.secs += self.step;
            self.secs
        }
        fn ticks(&mut self) -> u64 {
            (self.secs * self.hz) as u64
        }
    }

    #[test]
    fn synthetic_clock() {
        for hz in [1.0e9, 2.1e9, 2.394e9, 3.6e9, 4.99e9] {
            for step in [1e-3, 7e-5, 0.25] {
                let mut clock = FakeClock {
                    secs: 1000.0,
                    step,
                    hz,
                };
                let tps = TicksPerSecond::calibrate(&mut clock, Duration::from_secs(1));
                assert_eq!(tps.0 % GRANULARITY, 0);
                let err = (tps.0 as f64 - hz).abs();
                assert!(err <= GRANULARITY as f64 / 2.0 + 1.0, "hz {hz} step {step}: {tps:?}");
            }
        }
    }

    #[test]
    fn rounding() {
        assert_eq!(TicksPerSecond::from_sample(2_394_000_000, 1.0).0, 2_390_000_000);
        assert_eq!(TicksPerSecond::from_sample(2_396_000_000, 1.0).0, 2_400_000_000);
        assert_eq!(TicksPerSecond::from_sample(1_500_000_000, 0.5).0, 3_000_000_000);
        assert_eq!(TicksPerSecond::from_sample(0, 1.0).0, GRANULARITY);
    }

    #[test]
    fn tick_duration() {
        let tps = TicksPerSecond(2_500_000_000);
        assert!((tps.ghz() - 2.5).abs() < 1e-9);
        assert!((tps.tick_ns() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn real_clock_short() {
        let tps = TicksPerSecond::calibrate(&mut SystemClock, Duration::from_millis(20));
        assert!(tps.0 >= GRANULARITY);
    }
}
