//! Scenario file format: the topology and traffic a `cellnet` run replays
//! through a [`World`]. Distinct from [`SimConfig`]: `SimConfig` is engine
//! tuning (buffer thresholds, rate caps, ARQ policy); a scenario is "what's
//! on the map" — which towers and UEs exist, where, how the backhaul is
//! wired, and what each UE is trying to send.

use std::collections::HashMap;
use std::{fs, path::Path};

use serde::Deserialize;

use cellnet_core::types::{TowerHandle, TxIntent, TxMode, UeHandle};
use cellnet_core::{Error, Result, SimConfig};
use cellnet_sim::World;

/// A named tower placed at a meter position.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioTower {
    pub id: String,
    pub ip: u32,
    pub x: f64,
    pub y: f64,
}

/// A named UE placed at a meter position, with an optional traffic intent.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioUe {
    pub id: String,
    pub ip: u32,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub tx: TxIntent,
}

/// A bidirectional backhaul edge between two towers, referenced by id.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioLink {
    pub a: String,
    pub b: String,
}

/// A full scenario: engine tuning plus topology and traffic.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub sim: SimConfig,
    #[serde(default)]
    pub towers: Vec<ScenarioTower>,
    #[serde(default)]
    pub ues: Vec<ScenarioUe>,
    #[serde(default)]
    pub links: Vec<ScenarioLink>,
}

impl Scenario {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(&path).map_err(Error::from)?;
        Self::from_str(&data)
    }

    pub fn from_str(data: &str) -> Result<Self> {
        toml::from_str(data).map_err(Error::from)
    }

    /// Construct a `World` from this scenario and return it alongside the
    /// id-to-handle maps a driver needs to keep referring to the same
    /// towers/UEs by name (e.g. when applying further mutations between
    /// ticks).
    ///
    /// Errors with [`Error::config`] if a link names a tower id that was
    /// never declared in `[[towers]]` — a malformed topology reference,
    /// not a runtime condition to silently skip.
    pub fn build(&self) -> Result<Built> {
        let mut world = World::new(self.sim);

        let mut towers = HashMap::with_capacity(self.towers.len());
        for t in &self.towers {
            let handle = world.create_tower(t.ip, t.x, t.y);
            towers.insert(t.id.clone(), handle);
        }

        for link in &self.links {
            let a = *towers.get(&link.a).ok_or_else(|| {
                Error::config(format!("scenario link references unknown tower id {:?}", link.a))
            })?;
            let b = *towers.get(&link.b).ok_or_else(|| {
                Error::config(format!("scenario link references unknown tower id {:?}", link.b))
            })?;
            world.connect(a, b);
        }

        let mut ues = HashMap::with_capacity(self.ues.len());
        for u in &self.ues {
            let handle = world.create_ue(u.ip, u.x, u.y);
            if u.tx.mode != TxMode::None {
                world.set_ue_tx(handle, u.tx);
            }
            ues.insert(u.id.clone(), handle);
        }

        Ok(Built { world, towers, ues })
    }
}

/// A `World` built from a [`Scenario`], plus the id-to-handle maps needed
/// to address its towers/UEs by the names the scenario file gave them.
pub struct Built {
    pub world: World,
    pub towers: HashMap<String, TowerHandle>,
    pub ues: HashMap<String, UeHandle>,
}
