//! Simulation configuration. Parses a TOML file into a strongly-typed
//! structure; every field has a sane default so a `World` can be built
//! from `SimConfig::default()` without a config file at all.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::error::{Error, Result};

/// Tunables for the UE stop-and-wait ARQ described in §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArqConfig {
    /// Ticks to wait for an ACK before retransmitting the head packet.
    pub timeout_ticks: u64,
    /// Retransmissions allowed before the head packet is dropped. Setting
    /// this to 0 disables ARQ entirely (send-and-forget).
    pub max_retx: u32,
}

impl Default for ArqConfig {
    fn default() -> Self {
        Self {
            timeout_ticks: 5,
            max_retx: 3,
        }
    }
}

/// Per-tick driver and channel tunables, covering every knob §6's driver
/// API exposes plus the buffer thresholds from §3's data model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Simulation ticks per wall-clock second. Drives `Δt = 1 / steps_per_sec`.
    pub steps_per_sec: u32,
    /// Whether the channel model can drop packets / accumulate bit errors.
    pub noise_enabled: bool,
    /// Bit capacity of a UE's outgoing send queue.
    pub ue_buffer_threshold_bits: u64,
    /// Bit capacity of a tower's backhaul ingress FIFO.
    pub tower_buffer_threshold_bits: u64,
    /// Per-tower aggregate egress rate cap, in bits per second.
    pub tower_max_rate_bps: u64,
    /// ARQ timeout/retry policy, shared by every UE unless overridden.
    pub arq: ArqConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            steps_per_sec: 2,
            noise_enabled: false,
            ue_buffer_threshold_bits: 1_000_000_000,
            tower_buffer_threshold_bits: 10_000_000_000,
            tower_max_rate_bps: 10_000_000_000,
            arq: ArqConfig::default(),
        }
    }
}

impl SimConfig {
    /// Tick length in seconds, derived from `steps_per_sec`.
    pub fn dt(&self) -> f64 {
        1.0 / self.steps_per_sec.max(1) as f64
    }

    /// Load a configuration file from the given path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(&path).map_err(Error::from)?;
        Self::from_str(&data)
    }

    /// Parse a configuration document already read into memory.
    pub fn from_str(data: &str) -> Result<Self> {
        let cfg = toml::from_str::<SimConfig>(data).map_err(Error::from)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations that would make the simulation meaningless
    /// (e.g. zero ticks per second, which would divide by zero downstream).
    pub fn validate(&self) -> Result<()> {
        if self.steps_per_sec == 0 {
            return Err(Error::config("steps_per_sec must be >= 1"));
        }
        if self.ue_buffer_threshold_bits == 0 {
            return Err(Error::config("ue_buffer_threshold_bits must be > 0"));
        }
        if self.tower_buffer_threshold_bits == 0 {
            return Err(Error::config("tower_buffer_threshold_bits must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        SimConfig::default().validate().unwrap();
    }

    #[test]
    fn dt_follows_steps_per_sec() {
        let mut cfg = SimConfig::default();
        cfg.steps_per_sec = 4;
        assert!((cfg.dt() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = SimConfig::from_str("steps_per_sec = 10\n").unwrap();
        assert_eq!(cfg.steps_per_sec, 10);
        assert_eq!(cfg.arq.max_retx, ArqConfig::default().max_retx);
    }

    #[test]
    fn zero_steps_per_sec_rejected() {
        let err = SimConfig::from_str("steps_per_sec = 0\n").unwrap_err();
        assert!(err.to_string().contains("steps_per_sec"));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.toml");
        fs::write(&path, "steps_per_sec = 5\nnoise_enabled = true\n").unwrap();
        let cfg = SimConfig::from_file(&path).unwrap();
        assert_eq!(cfg.steps_per_sec, 5);
        assert!(cfg.noise_enabled);
    }
}
