use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use colony::{
    engine::{EngineBuilder, EngineSettings},
    scenario::ScenarioLoader,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Colony construction simulation runner")]
struct Cli {
    /// Path to the scenario YAML file
    #[arg(long, default_value = "scenarios/outpost.yaml")]
    scenario: PathBuf,

    /// Override tick count (uses scenario default when omitted)
    #[arg(long)]
    ticks: Option<u64>,

    /// Override seconds of simulated time per tick
    #[arg(long)]
    dt: Option<f64>,

    /// Print the final world summary as JSON
    #[arg(long)]
    json: bool,
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let loader = ScenarioLoader::new(".");
    let scenario = loader.load(&cli.scenario)?;
    init_tracing(&scenario.logging.level);

    let mut world = scenario.build_world()?;
    let ticks = scenario.ticks(cli.ticks);
    let dt = scenario.dt(cli.dt);
    anyhow::ensure!(dt.is_finite() && dt > 0.0, "--dt must be positive, got {dt}");

    let settings = EngineSettings {
        scenario_name: scenario.name.clone(),
        seed: scenario.seed,
        dt,
    };
    let mut engine = EngineBuilder::new(settings)
        .with_system(scenario.order_system())
        .build();

    let run = engine.run(&mut world, ticks)?;
    let summary = world.summary();
    if cli.json {
        let json = serde_json::to_string_pretty(&summary).context("Failed to encode summary")?;
        println!("{json}");
    } else {
        let built: Vec<String> = summary
            .structures
            .iter()
            .map(|(kind, count)| format!("{count} {kind}"))
            .collect();
        println!(
            "Scenario '{}' completed for {} ticks ({:.1}s). Built: {}. Jobs completed: {}, still open: {}",
            run.scenario,
            run.ticks,
            run.simulated_seconds,
            if built.is_empty() {
                "nothing".to_string()
            } else {
                built.join(", ")
            },
            summary.jobs_completed,
            summary.jobs_open
        );
    }
    Ok(())
}
