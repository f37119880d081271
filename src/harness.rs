//! The measurement loop and the state it shares with the remote thread.
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
};

use anyhow::{anyhow, Context, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::{
    arch,
    config::Config,
    copy::copy_packets,
    evict::{Evictor, EVICT_TOUCHES, SCRATCH_LINES},
    remote,
    report::Report,
    tsc::{SystemClock, TicksPerSecond},
    workload::{Workload, IMIX, MAX_PAD_LINES},
};

/// Everything both threads see.
///
/// The workload is only read after setup, apart from the remote thread
/// mutating source bytes while `trigger` is armed.
pub struct Shared {
    pub workload: Workload,
    /// Armed by the main thread, disarmed by the remote thread once all
    /// sources are touched.
    pub trigger: AtomicBool,
    /// Tells the remote thread to exit.
    pub stop: AtomicBool,
}

impl Shared {
    pub fn new(workload: Workload) -> Self {
        Self {
            workload,
            trigger: AtomicBool::new(false),
            stop: AtomicBool::new(false),
        }
    }
}

/// How many measurement cycles to run.
#[derive(Clone, Copy, Debug)]
pub enum Budget {
    Forever,
    Cycles(usize),
}

/// Raw counter readings around one copy.
#[derive(Clone, Copy, Debug)]
pub struct Sample {
    pub start: u64,
    pub end: u64,
}

impl Sample {
    pub fn ticks(&self) -> u64 {
        self.end.wrapping_sub(self.start)
    }
}

pub struct Harness {
    shared: Arc<Shared>,
    evictor: Evictor,
    tps: TicksPerSecond,
    remote: Option<JoinHandle<()>>,
}

impl Harness {
    /// Pin, calibrate, allocate and start the remote thread.
    pub fn new(config: &Config) -> Result<Self> {
        if let Some(cpu) = config.local_cpu {
            arch::pin_current_thread(cpu).context("pinning main thread")?;
        }

        let tps = TicksPerSecond::calibrate(&mut SystemClock, config.calibration);
        tps.print();

        let mut rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let evictor = Evictor::new(SCRATCH_LINES, EVICT_TOUCHES, config.lock, config.seed)?;
        let workload =
            Workload::generate(config.n_copy, &IMIX, MAX_PAD_LINES, config.lock, &mut rng)?;
        workload.print();

        let shared = Arc::new(Shared::new(workload));
        let remote = remote::spawn(shared.clone(), config.remote_cpu)?;
        arch::print_placement("main");

        Ok(Self {
            shared,
            evictor,
            tps,
            remote: Some(remote),
        })
    }

    pub fn ticks_per_second(&self) -> TicksPerSecond {
        self.tps
    }

    pub fn workload(&self) -> &Workload {
        &self.shared.workload
    }

    /// Arm the remote thread, evict, wait for the remote pass, time the copy.
    ///
    /// Fails when the remote thread is gone, since the trigger would then
    /// never be disarmed.
    pub fn cycle(&mut self) -> Result<Sample> {
        self.shared.trigger.store(true, Ordering::Release);

        self.evictor.evict();

        while self.shared.trigger.load(Ordering::Acquire) {
            if self.remote.as_ref().map_or(true, |h| h.is_finished()) {
                return Err(self.remote_gone());
            }
            arch::spin();
        }

        let start = arch::rdtsc();
        // SAFETY: the trigger is disarmed, so the remote thread stays away
        // from the buffers until the next cycle.
        unsafe { copy_packets(self.shared.workload.packets()) };
        let end = arch::rdtsc();
        Ok(Sample { start, end })
    }

    fn remote_gone(&mut self) -> anyhow::Error {
        match self.remote.take().map(remote::join) {
            Some(Err(err)) => err,
            Some(Ok(())) => anyhow!("remote thread exited"),
            None => anyhow!("remote thread is not running"),
        }
    }

    /// Run cycles, printing a report roughly once per calibrated second.
    /// Returns the number of reports printed.
    pub fn run(&mut self, budget: Budget) -> Result<usize> {
        let mut last_print = 0u64;
        let mut reports = 0;
        let mut cycles = 0;
        loop {
            if let Budget::Cycles(n) = budget {
                if cycles == n {
                    return Ok(reports);
                }
            }
            let sample = self.cycle()?;
            cycles += 1;
            if last_print.saturating_add(self.tps.0) < sample.start {
                println!(
                    "{}",
                    Report::new(sample.ticks(), self.workload(), self.tps)
                );
                last_print = sample.start;
                reports += 1;
            }
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        if let Some(handle) = self.remote.take() {
            if let Err(err) = remote::stop(&self.shared.stop, handle) {
                eprintln!("{err:#}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::alloc::MemLock;

    #[test]
    fn exited_remote_fails_cycle() {
        let config = Config {
            n_copy: 8,
            local_cpu: None,
            remote_cpu: None,
            calibration: Duration::from_millis(20),
            lock: MemLock::Skip,
            seed: Some(2),
        };
        let mut harness = Harness::new(&config).unwrap();
        harness.cycle().unwrap();

        // Let the remote thread leave its loop while idle.
        harness.shared.stop.store(true, Ordering::Relaxed);
        while !harness.remote.as_ref().unwrap().is_finished() {
            std::thread::yield_now();
        }

        let err = harness.cycle().unwrap_err();
        assert!(err.to_string().contains("remote thread exited"), "{err:#}");
        assert!(harness.remote.is_none());
        // Not running any more either.
        let err = harness.cycle().unwrap_err();
        assert!(err.to_string().contains("not running"), "{err:#}");
    }
}
