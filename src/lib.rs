/// Cache-line aligned, `mlock`ed buffers.
pub mod alloc;
/// Performance primitives: TSC, prefetch, fences, CPU placement.
pub mod arch;
pub mod config;
/// The batched copy under test.
pub mod copy;
pub mod evict;
/// Measurement loop and shared state.
pub mod harness;
pub mod remote;
pub mod report;
/// TSC calibration.
pub mod tsc;
pub mod workload;


pub use config::Config;
pub use harness::{Budget, Harness};

/// Size of a cache line in bytes.
pub const CACHELINE: usize = 64;
