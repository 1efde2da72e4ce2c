//! Per-tick metrics snapshots returned from [`crate::world::World::step`].
//!
//! These replace the shared, continuously-mutated counters a UI would
//! otherwise poll directly off live `Tower`/`Ue` state: a snapshot is a
//! plain value, safe to hand across a thread boundary or hold onto after
//! the tick that produced it has moved on.

use cellnet_core::types::{Band, TowerHandle, UeHandle};

/// Snapshot of one tower's state at the end of a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TowerTick {
    pub handle: TowerHandle,
    pub operational: bool,
    pub ingress_bits: u64,
    pub tx_bytes: u64,
    pub ber: f64,
    pub attached_ue_count: usize,
}

/// Snapshot of one UE's state at the end of a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct UeTick {
    pub handle: UeHandle,
    pub current_tower: Option<TowerHandle>,
    pub band: Option<Band>,
    pub code_rate: f64,
    pub queue_len: usize,
    pub queue_bits: u64,
    pub tx_bytes: u64,
    pub ber: f64,
}

/// Everything observable about a completed tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickMetrics {
    pub tick: u64,
    pub towers: Vec<TowerTick>,
    pub ues: Vec<UeTick>,
}

impl TickMetrics {
    pub fn tower(&self, handle: TowerHandle) -> Option<&TowerTick> {
        self.towers.iter().find(|t| t.handle == handle)
    }

    pub fn ue(&self, handle: UeHandle) -> Option<&UeTick> {
        self.ues.iter().find(|u| u.handle == handle)
    }

    pub fn total_tx_bytes(&self) -> u64 {
        self.towers.iter().map(|t| t.tx_bytes).sum()
    }
}
