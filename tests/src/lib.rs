//! Shared scaffolding for the end-to-end scenario tests under `tests/`.
//!
//! These tests exercise the engine only through its public driver API
//! (`cellnet_sim::World` plus `cellnet_core` value types), never through
//! private fields — the same boundary a real driver (the CLI, or a future
//! UI) would be held to.

use cellnet_core::SimConfig;
use cellnet_sim::World;

/// A `SimConfig` with `Δt = 0.5s`, matching every scenario in the design
/// document's end-to-end walkthroughs.
pub fn scenario_config() -> SimConfig {
    let mut cfg = SimConfig::default();
    cfg.steps_per_sec = 2;
    cfg
}

/// A `World` seeded for reproducible channel-drop behavior.
pub fn world(seed: u64) -> World {
    World::with_seed(scenario_config(), seed)
}

/// Step `world` until `done` reports success or `max_ticks` elapses.
/// Returns `true` iff `done` was satisfied before the budget ran out.
pub fn run_until(world: &mut World, max_ticks: u64, mut done: impl FnMut(&mut World) -> bool) -> bool {
    for _ in 0..max_ticks {
        world.step();
        if done(world) {
            return true;
        }
    }
    false
}
