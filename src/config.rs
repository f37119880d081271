use std::time::Duration;

use crate::alloc::MemLock;

/// Parameters for one harness run.
///
/// Since these are only read during setup they are plain fields. The traffic
/// mix, padding and eviction sizes are fixed; see [`crate::workload::IMIX`],
/// [`crate::workload::MAX_PAD_LINES`] and [`crate::evict::SCRATCH_LINES`].
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of packets copied per measurement.
    pub n_copy: usize,
    /// Cpu of the measuring thread. `None` leaves it unpinned.
    pub local_cpu: Option<usize>,
    /// Cpu of the remote toucher. `None` leaves it unpinned.
    pub remote_cpu: Option<usize>,
    /// Wall time spent calibrating the TSC.
    pub calibration: Duration,
    pub lock: MemLock,
    /// Seed for padding and eviction offsets; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            n_copy: 512,
            local_cpu: Some(1),
            remote_cpu: Some(2),
            calibration: Duration::from_secs(1),
            lock: MemLock::Required,
            seed: None,
        }
    }
}
