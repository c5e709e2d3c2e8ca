//! RateMesh Simulator
//!
//! Runs rate lookup scenarios against the rate graph engine on a simulated
//! clock and reports the results.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod metrics;
mod scenario;

use controller::SimulationController;
use ratemesh_fx::{ConversionFallback, RateGraphConfig};
use scenario::Scenario;

/// RateMesh Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "Run rate graph scenarios against the RateMesh engine")]
struct Args {
    /// Built-in scenario to run
    #[arg(short, long, default_value = "crypto-bridge", conflicts_with = "file")]
    scenario: String,

    /// Load the scenario from a JSON file instead
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Behaviour of conversions without a rate (strict or identity)
    #[arg(long)]
    fallback: Option<ConversionFallback>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// List built-in scenarios and exit
    #[arg(long)]
    list: bool,
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    );
    let (plain, structured) = if json {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer()), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(structured)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.list {
        for name in Scenario::BUILT_IN {
            println!("{}", name);
        }
        return Ok(());
    }

    init_logging(args.json_logs);

    let scenario = match &args.file {
        Some(path) => Scenario::from_file(path)?,
        None => Scenario::load(&args.scenario)?,
    };

    let mut config = RateGraphConfig::from_env()?;
    if let Some(fallback) = args.fallback {
        config.conversion_fallback = fallback;
    }

    info!("Starting RateMesh Simulator");
    info!("Scenario: {}", scenario.name);

    let mut controller = SimulationController::new(&scenario, config);
    controller.run_scenario(&scenario).await?;

    let metrics = controller.metrics();
    let cache = controller.cache_stats();
    info!("Simulation complete");
    info!(
        "Queries: {} ({} resolved, {} inferred, {} unresolved)",
        metrics.total_queries,
        metrics.resolved_queries,
        metrics.inferred_queries,
        metrics.unresolved_queries
    );
    info!("Hit rate: {:.1}%", metrics.hit_rate() * 100.0);
    info!("Fallback conversions: {}", metrics.fallback_conversions);
    info!(
        "Average latency: {}us (p99 {}us)",
        metrics.average_latency_us(),
        metrics.p99_latency_us()
    );
    info!("Cached graphs: {} {:?}", cache.size, cache.keys);
    info!(
        "Expectations: {} passed, {} failed",
        metrics.expectations_passed, metrics.expectations_failed
    );

    if metrics.expectations_failed > 0 {
        anyhow::bail!("{} expectation(s) failed", metrics.expectations_failed);
    }

    Ok(())
}
