//! Tower (base station): backhaul ingress FIFO, per-UE rate arbitration,
//! and egress admission control.
//!
//! Like [`crate::ue::Ue`], a `Tower` never holds references to the UEs or
//! peer towers it deals with — only [`UeHandle`]/[`TowerHandle`] values.
//! Actually routing a popped packet to a local UE or a peer tower is
//! [`crate::world::World`]'s job, since that requires simultaneous access
//! to more than one entity in the same collection; what lives here is
//! everything a tower can decide with only its own state: ingress
//! admission, egress ordering, and per-UE budget bookkeeping.

use std::collections::{HashMap, VecDeque};

use cellnet_core::types::{Band, TowerHandle, UeHandle};

use crate::packet::Packet;

/// Outcome of popping the next packet off a tower's ingress queue.
#[derive(Debug)]
pub enum EgressPop {
    /// Nothing queued.
    Empty,
    /// A packet was popped but its hop count had already reached the
    /// limit; it is dropped here and never routed further.
    HopDropped,
    /// A packet is ready to be routed by the caller.
    Packet(Packet),
}

/// Outcome of attempting to admit a packet into a tower's ingress FIFO.
/// A typed replacement for a bare `bool`, per the per-tick outcome
/// taxonomy: these are recoverable, expected events, not values of
/// `cellnet_core::Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Admitted: `hop_count` incremented, `via_ip` set, bits charged.
    Admitted,
    /// The tower is not operational; nothing was admitted.
    NotOperational,
    /// `hop_count` had already reached `hop_limit` on arrival.
    HopLimitExceeded,
    /// Admitting this packet would push ingress past `buffer_threshold_bits`.
    BufferOverflow,
}

impl ReceiveOutcome {
    /// Shorthand for callers that only care whether the packet was
    /// actually queued.
    pub fn admitted(self) -> bool {
        matches!(self, ReceiveOutcome::Admitted)
    }
}

/// A base station.
#[derive(Debug, Clone)]
pub struct Tower {
    pub handle: TowerHandle,
    pub ip_addr: u32,
    pub x: f64,
    pub y: f64,
    pub operational: bool,
    attached: Vec<UeHandle>,
    peers: Vec<TowerHandle>,
    band_occupancy: HashMap<Band, u32>,
    ue_grant_bits: HashMap<UeHandle, u64>,
    ue_sent_bits: HashMap<UeHandle, u64>,
    ingress: VecDeque<Packet>,
    ingress_bits: u64,
    tx_bytes_this_tick: u64,
    total_bits_tx: u64,
    bit_errors: f64,
    pub hop_limit: u32,
    buffer_threshold_bits: u64,
    max_rate_bps: u64,
    dt: f64,
}

impl Tower {
    pub fn new(
        handle: TowerHandle,
        ip_addr: u32,
        x: f64,
        y: f64,
        buffer_threshold_bits: u64,
        max_rate_bps: u64,
        hop_limit: u32,
        dt: f64,
    ) -> Self {
        Self {
            handle,
            ip_addr,
            x,
            y,
            operational: true,
            attached: Vec::new(),
            peers: Vec::new(),
            band_occupancy: HashMap::new(),
            ue_grant_bits: HashMap::new(),
            ue_sent_bits: HashMap::new(),
            ingress: VecDeque::new(),
            ingress_bits: 0,
            tx_bytes_this_tick: 0,
            total_bits_tx: 1, // matches the "never divide by zero" floor used for BER
            bit_errors: 0.0,
            hop_limit,
            buffer_threshold_bits,
            max_rate_bps,
            dt,
        }
    }

    pub fn set_dt(&mut self, dt: f64) {
        self.dt = dt;
    }

    pub fn attached_ues(&self) -> &[UeHandle] {
        &self.attached
    }

    pub fn peers(&self) -> &[TowerHandle] {
        &self.peers
    }

    pub fn has_peer(&self, other: TowerHandle) -> bool {
        self.peers.contains(&other)
    }

    pub fn add_peer(&mut self, other: TowerHandle) {
        if !self.peers.contains(&other) {
            self.peers.push(other);
        }
    }

    pub fn remove_peer(&mut self, other: TowerHandle) {
        self.peers.retain(|p| *p != other);
    }

    pub fn clear_peers(&mut self) -> Vec<TowerHandle> {
        std::mem::take(&mut self.peers)
    }

    pub fn band_occupancy(&self, band: Band) -> u32 {
        *self.band_occupancy.get(&band).unwrap_or(&0)
    }

    /// Attach `ue` in `band`, bumping that band's occupancy count.
    pub fn attach(&mut self, ue: UeHandle, band: Band) {
        if !self.attached.contains(&ue) {
            self.attached.push(ue);
        }
        *self.band_occupancy.entry(band).or_insert(0) += 1;
    }

    /// Detach `ue`, which was previously in `band`, releasing its grant.
    pub fn detach(&mut self, ue: UeHandle, band: Option<Band>) {
        self.attached.retain(|h| *h != ue);
        if let Some(b) = band {
            if let Some(count) = self.band_occupancy.get_mut(&b) {
                *count = count.saturating_sub(1);
            }
        }
        self.ue_grant_bits.remove(&ue);
        self.ue_sent_bits.remove(&ue);
    }

    /// Move `ue`'s occupancy from `old` to `new` without detaching it.
    pub fn change_band(&mut self, old: Option<Band>, new: Band) {
        if let Some(old_band) = old {
            if let Some(count) = self.band_occupancy.get_mut(&old_band) {
                *count = count.saturating_sub(1);
            }
        }
        *self.band_occupancy.entry(new).or_insert(0) += 1;
    }

    /// Recompute per-UE rate grants from scratch, given the current
    /// `(handle, band, code_rate)` of every attached UE. Zeroes every
    /// per-UE sent-bits counter, per §4.4.
    pub fn recompute_rates(&mut self, members: &[(UeHandle, Band, f64)]) {
        self.ue_grant_bits.clear();
        self.ue_sent_bits.clear();

        let mut counts: HashMap<Band, u32> = HashMap::new();
        for (_, band, _) in members {
            *counts.entry(*band).or_insert(0) += 1;
        }

        for (ue, band, code_rate) in members {
            let sharing = counts.get(band).copied().unwrap_or(1).max(1);
            let shared_rate = band.base_rate_bps() / sharing as f64;
            let grant = (shared_rate * self.dt * code_rate) as u64;
            self.ue_grant_bits.insert(*ue, grant);
            self.ue_sent_bits.insert(*ue, 0);
        }
    }

    /// This tower's current per-tick grant for `ue`, in bits, as computed
    /// by the last [`Tower::recompute_rates`] call. Zero if `ue` is not
    /// (or no longer) attached. Fed back into the UE's own uplink budget
    /// by `World`, since a UE's radio has one rate shared by both
    /// directions (§4.4/§4.6) rather than an independently configured
    /// uplink cap.
    pub fn grant_bits(&self, ue: UeHandle) -> u64 {
        self.ue_grant_bits.get(&ue).copied().unwrap_or(0)
    }

    /// Attempt to charge `bits` against `ue`'s per-tick grant. Returns
    /// `true` (and charges it) only if the grant is not exceeded.
    pub fn try_charge_ue(&mut self, ue: UeHandle, bits: u64) -> bool {
        let grant = self.ue_grant_bits.get(&ue).copied().unwrap_or(0);
        let sent = self.ue_sent_bits.entry(ue).or_insert(0);
        if *sent + bits <= grant {
            *sent += bits;
            true
        } else {
            false
        }
    }

    /// Admit `packet` to the ingress FIFO. Drops immediately on hop-limit
    /// exceed, tower outage, or buffer overflow; see [`ReceiveOutcome`].
    pub fn receive(&mut self, mut packet: Packet) -> ReceiveOutcome {
        if !self.operational {
            return ReceiveOutcome::NotOperational;
        }
        if packet.hop_count >= self.hop_limit {
            tracing::debug!(tower = %self.handle, "dropping inbound packet: hop limit exceeded");
            return ReceiveOutcome::HopLimitExceeded;
        }
        let bits = packet.bit_len();
        if self.ingress_bits + bits > self.buffer_threshold_bits {
            tracing::warn!(tower = %self.handle, "ingress buffer overflow, rejecting packet");
            return ReceiveOutcome::BufferOverflow;
        }
        packet.hop_count += 1;
        packet.via_ip = Some(self.ip_addr);
        self.ingress_bits += bits;
        self.ingress.push_front(packet);
        ReceiveOutcome::Admitted
    }

    /// `true` iff this tower has something to send and sending it would
    /// not exceed its per-tick egress rate cap.
    pub fn can_transmit(&self) -> bool {
        if !self.operational {
            return false;
        }
        let Some(next) = self.ingress.back() else {
            return false;
        };
        let next_bytes = next.bit_len() / 8;
        let budget_bytes = ((self.max_rate_bps as f64 * self.dt) / 8.0) as u64;
        self.tx_bytes_this_tick + next_bytes <= budget_bytes
    }

    /// Pop the oldest ingress packet for routing by the caller.
    pub fn pop_egress(&mut self) -> EgressPop {
        let Some(packet) = self.ingress.pop_back() else {
            return EgressPop::Empty;
        };
        let bits = packet.bit_len();
        self.ingress_bits = self.ingress_bits.saturating_sub(bits);
        if packet.hop_count >= self.hop_limit {
            tracing::debug!(tower = %self.handle, "dropping egress packet: hop limit exceeded");
            return EgressPop::HopDropped;
        }
        EgressPop::Packet(packet)
    }

    pub fn record_egress(&mut self, bits: u64) {
        self.tx_bytes_this_tick += bits / 8;
        self.total_bits_tx += bits;
    }

    pub fn record_channel_drop(&mut self, bits: u64, distance: f64, max_range: f64) {
        self.bit_errors += crate::channel::bit_errors(bits, distance, max_range);
    }

    pub fn ingress_bits(&self) -> u64 {
        self.ingress_bits
    }

    pub fn tx_bytes_this_tick(&self) -> u64 {
        self.tx_bytes_this_tick
    }

    pub fn ber(&self) -> f64 {
        self.bit_errors / (self.total_bits_tx.max(1) as f64)
    }

    pub fn clear_tick_counters(&mut self) {
        self.tx_bytes_this_tick = 0;
    }
}
