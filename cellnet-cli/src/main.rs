#![forbid(unsafe_code)]

//! `cellnet`: the small driver binary assumed by the simulation core.
//!
//! Loads a scenario file (towers, UEs, backhaul links, per-UE traffic
//! intents), builds a [`cellnet_sim::World`] from it, steps the world a
//! fixed number of times, and prints per-tick metrics — either a short
//! human-readable summary line or one JSON object per tick for scripted
//! consumption.

mod scenario;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use cellnet_sim::TickMetrics;
use scenario::Scenario;

/// Drive a cellular network simulation scenario for a fixed number of ticks.
#[derive(Debug, Parser)]
#[command(name = "cellnet", version, about)]
struct Cli {
    /// Path to a scenario TOML file (towers, UEs, links, traffic intents).
    scenario: PathBuf,

    /// Number of ticks to run.
    #[arg(long, short = 'n', default_value_t = 20)]
    ticks: u64,

    /// Print one JSON object per tick instead of a human-readable line.
    #[arg(long)]
    json: bool,

    /// Run as fast as possible instead of sleeping `Δt` between ticks.
    /// The engine itself never sleeps; this only affects whether this
    /// binary paces its own loop to wall-clock time.
    #[arg(long)]
    no_pacing: bool,
}

/// Flattened, serializable view of one tick's metrics, printed by the
/// `--json` mode. [`TickMetrics`] itself stays serde-free since it is an
/// engine type, not a wire format owned by this binary.
#[derive(Debug, Serialize)]
struct TickSummary {
    tick: u64,
    tower_count: usize,
    ue_count: usize,
    total_tx_bytes: u64,
    avg_tower_ber: f64,
    avg_ue_ber: f64,
}

impl From<&TickMetrics> for TickSummary {
    fn from(m: &TickMetrics) -> Self {
        let avg_tower_ber = if m.towers.is_empty() {
            0.0
        } else {
            m.towers.iter().map(|t| t.ber).sum::<f64>() / m.towers.len() as f64
        };
        let avg_ue_ber = if m.ues.is_empty() {
            0.0
        } else {
            m.ues.iter().map(|u| u.ber).sum::<f64>() / m.ues.len() as f64
        };
        Self {
            tick: m.tick,
            tower_count: m.towers.len(),
            ue_count: m.ues.len(),
            total_tx_bytes: m.total_tx_bytes(),
            avg_tower_ber,
            avg_ue_ber,
        }
    }
}

fn run(cli: &Cli) -> cellnet_core::Result<()> {
    let scenario = Scenario::from_file(&cli.scenario)?;
    let mut built = scenario.build()?;
    let dt = built.world.dt();

    tracing::info!(
        towers = built.towers.len(),
        ues = built.ues.len(),
        ticks = cli.ticks,
        pacing = !cli.no_pacing,
        "starting simulation run"
    );

    for tick in 0..cli.ticks {
        let metrics = built.world.step();
        let summary = TickSummary::from(&metrics);
        if cli.json {
            // Safe: TickSummary is a plain struct of numbers, never fails.
            let line = serde_json::to_string(&summary).unwrap_or_default();
            println!("{line}");
        } else {
            println!(
                "tick {:>5}  towers={:<3} ues={:<3} tx_bytes={:<8} tower_ber={:.6} ue_ber={:.6}",
                summary.tick,
                summary.tower_count,
                summary.ue_count,
                summary.total_tx_bytes,
                summary.avg_tower_ber,
                summary.avg_ue_ber,
            );
        }
        // Wall-clock pacing is this driver's concern, not the engine's: the
        // core crate never sleeps, so embedding it elsewhere is unaffected.
        if !cli.no_pacing && tick + 1 < cli.ticks {
            std::thread::sleep(Duration::from_secs_f64(dt));
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
