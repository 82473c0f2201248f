//! Dynamic terrain testbed
//!
//! Drops bodies onto a procedural voxel world and logs how terrain collision
//! follows them. Set `RUST_LOG=terrain_physics=trace` to watch individual
//! sections being requested, built and retired.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use terrain_physics::terrain::WorkerPoolScheduler;
use terrain_physics::TerrainSettings;
use terrain_testbed::{HillsWorld, Testbed, TestbedConfig};
use tracing_subscriber::EnvFilter;

/// Dynamic terrain collision testbed
#[derive(Parser)]
#[command(name = "terrain-testbed")]
#[command(about = "Headless run of dynamic terrain collision around falling bodies")]
struct Args {
    /// Number of physics steps to simulate
    #[arg(short, long, default_value_t = 600)]
    steps: usize,

    /// Number of dynamic bodies
    #[arg(short, long, default_value_t = 32)]
    bodies: usize,

    /// Snapshot worker threads
    #[arg(short, long, default_value_t = 2)]
    threads: usize,

    /// Loaded world radius, in sections
    #[arg(long, default_value_t = 8)]
    radius: i32,

    /// Dig under a body every N steps (0 disables)
    #[arg(long, default_value_t = 120)]
    dig_every: usize,

    /// Terrain settings file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let settings = match &args.config {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading terrain settings");
            TerrainSettings::load(path)?
        }
        None => TerrainSettings::default(),
    };

    let world = Arc::new(HillsWorld::new(args.radius));
    let scheduler = WorkerPoolScheduler::new(Arc::clone(&world), args.threads)?;
    let config = TestbedConfig {
        steps: args.steps,
        bodies: args.bodies,
        dig_every: args.dig_every,
        ..TestbedConfig::default()
    };

    let mut testbed = Testbed::new(world, scheduler, settings, config)?;
    testbed.run(1.0 / 60.0);

    let stats = testbed.finish();
    anyhow::ensure!(
        stats.colliders == 0,
        "{} terrain colliders left after teardown",
        stats.colliders
    );
    Ok(())
}
