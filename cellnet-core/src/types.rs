//! Shared identifiers and value types for the cellular network simulator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved destination address meaning "every UE attached to the
/// delivering tower". Never assigned to a real tower or UE.
pub const BROADCAST_IP: u32 = 65535;

/// Stable, densely-packed handle to a tower inside a [`World`](crate).
///
/// Towers are never owned by value across the simulation graph (the
/// backhaul is cyclic); every reference to a tower is one of these
/// handles, resolved through the owning world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TowerHandle(pub u32);

impl fmt::Display for TowerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tower#{}", self.0)
    }
}

/// Stable handle to a UE inside a [`World`](crate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UeHandle(pub u32);

impl fmt::Display for UeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ue#{}", self.0)
    }
}

/// Service class a UE is granted by its attached tower, driven purely by
/// distance. Each band carries a fixed range and base throughput that is
/// shared among every UE the tower has placed in that band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    /// mmWave-like short range, high throughput.
    High,
    /// sub-6 GHz-like mid range.
    Mid,
    /// sub-1 GHz-like long range, low throughput.
    Low,
}

impl Band {
    /// Raw (non-hysteresis) range boundary for this band, in meters.
    pub fn range_m(self) -> f64 {
        match self {
            Band::High => 300.0,
            Band::Mid => 1500.0,
            Band::Low => 5000.0,
        }
    }

    /// Base throughput shared among every UE the tower places in this
    /// band, in bits per second.
    pub fn base_rate_bps(self) -> f64 {
        match self {
            Band::High => 1.0e9,
            Band::Mid => 200.0e6,
            Band::Low => 50.0e6,
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Band::High => "high",
            Band::Mid => "mid",
            Band::Low => "low",
        };
        write!(f, "{s}")
    }
}

/// Traffic-generation mode applied to a UE every tick, per §4.8 of the
/// simulation design: materialized into an enqueue call before the UE's
/// own step runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TxMode {
    /// Generate nothing this tick.
    #[default]
    None,
    /// Enqueue exactly `n_bytes` every tick.
    Fixed,
    /// Enqueue a uniformly random size in `[1, 65535]` bytes every tick.
    Random,
    /// Enqueue as many bytes as the UE's current rate budget allows.
    Max,
}

/// Typed replacement for the dynamically-assigned `tx_target_ip` style
/// attribute of the original driver: a UE's traffic intent is configured
/// as one unit rather than mutated field-by-field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct TxIntent {
    pub mode: TxMode,
    /// Destination IPv4 address. Required for `Fixed`/`Random`/`Max`.
    pub dst_ip: Option<u32>,
    /// Payload size in bytes. Required for `Fixed`, ignored otherwise.
    pub n_bytes: Option<u32>,
}

impl TxIntent {
    /// No traffic: the default configuration for a freshly created UE.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn fixed(dst_ip: u32, n_bytes: u32) -> Self {
        Self {
            mode: TxMode::Fixed,
            dst_ip: Some(dst_ip),
            n_bytes: Some(n_bytes),
        }
    }

    pub fn random(dst_ip: u32) -> Self {
        Self {
            mode: TxMode::Random,
            dst_ip: Some(dst_ip),
            n_bytes: None,
        }
    }

    pub fn max(dst_ip: u32) -> Self {
        Self {
            mode: TxMode::Max,
            dst_ip: Some(dst_ip),
            n_bytes: None,
        }
    }
}

/// Render a 32-bit address as a dotted quad for diagnostics/UI. The
/// reserved broadcast sentinel (65535) does not decompose meaningfully,
/// but is rendered anyway for consistency with ordinary addresses.
pub fn ip_to_dotted(ip: u32) -> String {
    format!(
        "{}.{}.{}.{}",
        (ip >> 24) & 0xFF,
        (ip >> 16) & 0xFF,
        (ip >> 8) & 0xFF,
        ip & 0xFF
    )
}
