use anyhow::Context;
use clap::Parser;
use smart_crossing::{Intersection, SimConfig};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "smart-crossing", about = "Signalized junction simulation")]
struct Args {
    /// TOML configuration file layered over the built-in defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of ticks to simulate in headless mode
    #[arg(long, default_value_t = 3600)]
    ticks: u64,

    /// Override the random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Run the queue-length fallback controller only
    #[arg(long)]
    no_policy: bool,

    /// Dispatch an emergency vehicle before the given tick (repeatable)
    #[arg(long = "emergency-at")]
    emergency_at: Vec<u64>,

    /// Write the final snapshot as JSON
    #[arg(long)]
    snapshot_json: Option<PathBuf>,

    /// Open the SDL2 window instead of running headless
    #[cfg(feature = "viewer")]
    #[arg(long)]
    viewer: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut cfg = SimConfig::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(seed) = args.seed {
        cfg.run.seed = seed;
    }
    if args.no_policy {
        cfg.policy.enabled = false;
    }

    init_logging(&cfg.logging.level);
    info!(seed = cfg.run.seed, policy = cfg.policy.enabled, "smart crossing starting");

    let mut sim = Intersection::new(cfg).context("building intersection")?;

    // Outermost boundary: a fault in the loop is logged and the run ends in order.
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| run(&mut sim, &args)))
        .unwrap_or_else(|cause| {
            let msg = cause
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| cause.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(anyhow::anyhow!("simulation loop panicked: {msg}"))
        });

    if let Err(e) = &outcome {
        error!(tick = sim.tick_count(), error = ?e, "simulation aborted");
    }

    println!("\n{}", sim.final_stats());
    outcome
}

fn run(sim: &mut Intersection, args: &Args) -> anyhow::Result<()> {
    #[cfg(feature = "viewer")]
    if args.viewer {
        return smart_crossing::viewer::run(sim).context("viewer");
    }

    for _ in 0..args.ticks {
        if args.emergency_at.contains(&(sim.tick_count() + 1)) {
            sim.spawn_emergency_vehicle();
        }
        sim.tick();
    }
    info!(ticks = sim.tick_count(), "headless run complete");

    if let Some(path) = &args.snapshot_json {
        let file = std::fs::File::create(path)
            .with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(file, &sim.snapshot()).context("writing snapshot")?;
        info!(path = %path.display(), "snapshot written");
    }
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},smart_crossing={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
