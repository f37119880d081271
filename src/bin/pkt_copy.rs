use clap::Parser;
use pkt_copy::{Budget, Config, Harness};

/// Measure batched packet copy throughput: sources hot in a remote core's
/// cache, destinations evicted from the local one.
#[derive(clap::Parser)]
struct Args {
    /// Number of packets to copy per measurement.
    n_copy: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    let Args { n_copy } = Args::parse();
    let defaults = Config::default();
    let config = Config {
        n_copy: n_copy.unwrap_or(defaults.n_copy),
        ..defaults
    };

    let mut harness = Harness::new(&config)?;
    harness.run(Budget::Forever)?;
    Ok(())
}
