//! UE (user equipment): attachment/band bookkeeping, send-queue ARQ, and
//! packet reception.
//!
//! A `Ue` never holds a reference to its tower — only a
//! [`TowerHandle`](cellnet_core::types::TowerHandle) resolved through the
//! owning [`crate::world::World`] — and it never computes distances to
//! other entities itself; that cross-entity work belongs to `World`. What
//! lives here is everything a UE can decide on its own once `World` has
//! told it the distance to its candidate tower: band selection, code
//! rate, fragmentation, and the stop-and-wait ARQ state machine.

use std::collections::VecDeque;

use cellnet_core::config::ArqConfig;
use cellnet_core::types::{Band, TowerHandle, TxIntent, TxMode, UeHandle};

use crate::channel;
use crate::packet::{self, Packet, PacketKind};

/// Result of asking a UE to prepare its next transmission this tick.
#[derive(Debug, Clone, PartialEq)]
pub enum ArqAction {
    /// Nothing queued.
    NoPacket,
    /// Queued, but not attached to any tower.
    NotAttached,
    /// Queued and attached, but the head packet would exceed this tick's
    /// bit budget.
    WaitingBudget,
    /// Attempt this packet against the channel this tick. It is not
    /// removed from the queue here; only ACK receipt (or max-retx
    /// give-up, already applied before this variant is returned) does.
    Ready(Packet),
}

/// Outcome of enqueueing a synthetic payload at the tail of a UE's send
/// queue. A typed replacement for a bare `bool`, per the per-tick outcome
/// taxonomy: these are recoverable, expected events, not values of
/// `cellnet_core::Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Every fragment was queued.
    Enqueued,
    /// Queueing stopped partway through because `buffer_threshold_bits`
    /// would have been exceeded; fragments queued before the cutoff stay
    /// queued.
    BufferOverflow,
}

impl EnqueueOutcome {
    /// Shorthand for callers that only care whether the whole payload made
    /// it onto the queue.
    pub fn enqueued(self) -> bool {
        matches!(self, EnqueueOutcome::Enqueued)
    }
}

/// Rank bands by service quality, best first. Used to decide whether a
/// candidate band is an upgrade over the UE's current one.
fn band_rank(band: Band) -> u8 {
    match band {
        Band::High => 0,
        Band::Mid => 1,
        Band::Low => 2,
    }
}

/// Band a UE would get at `distance` from a tower, ignoring hysteresis.
pub fn raw_band(distance: f64) -> Option<Band> {
    if distance <= Band::High.range_m() {
        Some(Band::High)
    } else if distance <= Band::Mid.range_m() {
        Some(Band::Mid)
    } else if distance <= Band::Low.range_m() {
        Some(Band::Low)
    } else {
        None
    }
}

fn meets_upgrade_gate(band: Band, distance: f64) -> bool {
    match band {
        Band::High => distance <= 0.7 * Band::High.range_m(),
        Band::Mid => distance <= 0.9 * Band::Mid.range_m(),
        Band::Low => distance <= Band::Low.range_m(),
    }
}

/// Select a UE's band at `distance`, applying the upgrade-hysteresis gate
/// whenever the candidate would be a strict improvement over
/// `current_band`. Downgrades and fresh attachments (no current band)
/// always use the raw thresholds, so a UE drifting out of range loses
/// service promptly.
pub fn select_band(distance: f64, current_band: Option<Band>) -> Option<Band> {
    let raw = raw_band(distance);
    match (current_band, raw) {
        (None, _) => raw,
        (Some(_), None) => None,
        (Some(cur), Some(candidate)) => {
            if band_rank(candidate) < band_rank(cur) && !meets_upgrade_gate(candidate, distance) {
                Some(cur)
            } else {
                Some(candidate)
            }
        }
    }
}

/// Code rate as a function of `distance / max_range`. Unattached UEs use
/// `0.9` (the caller is expected to pass `max_range <= 0.0` or skip the
/// call entirely when there is no attachment).
pub fn code_rate_for(distance: f64, max_range: f64) -> f64 {
    let ratio = if max_range > 0.0 { distance / max_range } else { 0.0 };
    if ratio <= 0.3 {
        0.9
    } else if ratio <= 0.7 {
        2.0 / 3.0
    } else {
        0.5
    }
}

/// A mobile endpoint.
#[derive(Debug, Clone)]
pub struct Ue {
    pub handle: UeHandle,
    pub ip_addr: u32,
    pub x: f64,
    pub y: f64,
    current_tower: Option<TowerHandle>,
    band: Option<Band>,
    max_range: f64,
    code_rate: f64,
    send_queue: VecDeque<Packet>,
    queue_bits: u64,
    next_packet_num: u16,
    tx_bytes_this_tick: u64,
    total_bits_tx: u64,
    bit_errors: f64,
    tx_intent: TxIntent,
    dt: f64,
    buffer_threshold_bits: u64,
    uplink_grant_bits: u64,
    arq: ArqConfig,
}

impl Ue {
    pub fn new(
        handle: UeHandle,
        ip_addr: u32,
        x: f64,
        y: f64,
        buffer_threshold_bits: u64,
        arq: ArqConfig,
        dt: f64,
    ) -> Self {
        Self {
            handle,
            ip_addr,
            x,
            y,
            current_tower: None,
            band: None,
            max_range: 0.0,
            code_rate: 0.9,
            send_queue: VecDeque::new(),
            queue_bits: 0,
            next_packet_num: 0,
            tx_bytes_this_tick: 0,
            total_bits_tx: 0,
            bit_errors: 0.0,
            tx_intent: TxIntent::none(),
            dt,
            buffer_threshold_bits,
            uplink_grant_bits: 0,
            arq,
        }
    }

    pub fn current_tower(&self) -> Option<TowerHandle> {
        self.current_tower
    }

    pub fn band(&self) -> Option<Band> {
        self.band
    }

    pub fn code_rate(&self) -> f64 {
        self.code_rate
    }

    pub fn max_range(&self) -> f64 {
        self.max_range
    }

    pub fn tx_intent(&self) -> TxIntent {
        self.tx_intent
    }

    pub fn set_tx_intent(&mut self, intent: TxIntent) {
        self.tx_intent = intent;
    }

    pub fn set_dt(&mut self, dt: f64) {
        self.dt = dt;
    }

    pub fn set_position(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
    }

    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        ((self.x - x).powi(2) + (self.y - y).powi(2)).sqrt()
    }

    /// Bit budget this tick: the same tower-arbitrated shared-band grant
    /// (`shared_rate · Δt · code_rate`, §4.4) that gates the tower's
    /// downlink to this UE, mirrored onto the uplink direction — a UE's
    /// radio has one rate, not an independent uplink cap. Zero while
    /// unattached.
    pub fn bit_budget(&self) -> u64 {
        self.uplink_grant_bits
    }

    /// Set the per-tick uplink bit grant, recomputed by the attached
    /// tower's rate arbitration (§4.4) whenever attachment or band
    /// changes. Zeroed on detach.
    pub fn set_uplink_grant(&mut self, bits: u64) {
        self.uplink_grant_bits = bits;
    }

    /// Bytes this tick's `mode = max` traffic would enqueue, per §4.8.
    pub fn max_mode_bytes(&self) -> u32 {
        (self.bit_budget() / 8) as u32
    }

    pub fn queue_bits(&self) -> u64 {
        self.queue_bits
    }

    pub fn queue_len(&self) -> usize {
        self.send_queue.len()
    }

    pub fn tx_bytes_this_tick(&self) -> u64 {
        self.tx_bytes_this_tick
    }

    pub fn total_bits_tx(&self) -> u64 {
        self.total_bits_tx
    }

    pub fn bit_errors(&self) -> f64 {
        self.bit_errors
    }

    /// Bit-error rate, `bit_errors / max(1, total_bits_tx)`.
    pub fn ber(&self) -> f64 {
        self.bit_errors / (self.total_bits_tx.max(1) as f64)
    }

    /// Called by `World` once it has resolved the UE's nearest tower and
    /// the candidate band at that distance. Updates attachment state and
    /// returns `true` if the attachment (tower or band) actually changed,
    /// so the caller knows whether to recompute tower rates.
    pub fn apply_attachment(
        &mut self,
        tower: Option<TowerHandle>,
        band: Option<Band>,
        max_range: f64,
        code_rate: f64,
    ) -> bool {
        let changed = self.current_tower != tower || self.band != band;
        self.current_tower = tower;
        self.band = band;
        self.max_range = if band.is_some() { max_range } else { 0.0 };
        self.code_rate = code_rate;
        if band.is_none() {
            self.uplink_grant_bits = 0;
        }
        changed
    }

    /// Split `n_bytes` of synthetic payload into fragments and enqueue
    /// them at the tail, stopping (not skipping) as soon as the buffer
    /// threshold would be exceeded.
    pub fn enqueue(&mut self, dst_ip: u32, n_bytes: u32, t_step: u64) -> EnqueueOutcome {
        if n_bytes == 0 {
            return EnqueueOutcome::Enqueued;
        }
        let payload = vec![0u8; n_bytes as usize];
        for chunk in payload.chunks(packet::MAX_FRAGMENT_SIZE) {
            let candidate = Packet::data(self.ip_addr, dst_ip, self.next_packet_num, chunk, t_step);
            let bits = candidate.bit_len();
            if self.queue_bits + bits > self.buffer_threshold_bits {
                tracing::warn!(ue = %self.handle, "send queue buffer overflow, truncating fragmentation");
                return EnqueueOutcome::BufferOverflow;
            }
            self.next_packet_num = self.next_packet_num.wrapping_add(1);
            self.queue_bits += bits;
            self.send_queue.push_back(candidate);
        }
        EnqueueOutcome::Enqueued
    }

    /// Run the ARQ state machine against the head of the send queue and
    /// decide what, if anything, to attempt transmitting this tick.
    pub fn prepare_transmit(&mut self, now: u64) -> ArqAction {
        let has_head = self.send_queue.front().is_some();
        if !has_head {
            return ArqAction::NoPacket;
        }

        let arq_applies = {
            let head = self.send_queue.front().expect("checked above");
            head.kind == PacketKind::Data && !head.is_broadcast() && self.arq.max_retx > 0
        };

        if arq_applies {
            let timed_out = {
                let head = self.send_queue.front().expect("checked above");
                now.saturating_sub(head.t_step) >= self.arq.timeout_ticks
            };
            if timed_out {
                let give_up = {
                    let head = self.send_queue.front_mut().expect("checked above");
                    head.retx_count += 1;
                    head.t_step = now;
                    head.retx_count > self.arq.max_retx
                };
                if give_up {
                    let dropped = self.send_queue.pop_front().expect("checked above");
                    self.queue_bits = self.queue_bits.saturating_sub(dropped.bit_len());
                    tracing::warn!(
                        ue = %self.handle,
                        packet_num = dropped.packet_num,
                        "max retx exceeded, dropping head packet"
                    );
                    return ArqAction::NoPacket;
                }
            }
        }

        if self.current_tower.is_none() {
            return ArqAction::NotAttached;
        }

        let head = self.send_queue.front().expect("checked above").clone();
        if head.bit_len() > self.bit_budget() {
            return ArqAction::WaitingBudget;
        }
        ArqAction::Ready(head)
    }

    /// Account a transmit attempt's bits, regardless of whether the
    /// channel later drops it: these counters measure transmitter
    /// activity, not delivery success.
    pub fn record_tx_attempt(&mut self, bits: u64) {
        self.tx_bytes_this_tick += bits / 8;
        self.total_bits_tx += bits;
    }

    /// Account bit errors from a channel-dropped transmission.
    pub fn record_channel_drop(&mut self, bits: u64, distance: f64) {
        self.bit_errors += channel::bit_errors(bits, distance, self.max_range.max(1.0));
    }

    /// Build the ACK to send back for a received DATA packet, and hand it
    /// to the caller to push into the attached tower's ingress.
    pub fn receive_data(&self, data: &Packet) -> Packet {
        Packet::ack_for(data)
    }

    /// Remove the first queued DATA packet matching `packet_num`,
    /// releasing its bits. Called when an ACK arrives.
    pub fn receive_ack(&mut self, packet_num: u16) {
        if let Some(pos) = self
            .send_queue
            .iter()
            .position(|p| p.kind == PacketKind::Data && p.packet_num == packet_num)
        {
            if let Some(removed) = self.send_queue.remove(pos) {
                self.queue_bits = self.queue_bits.saturating_sub(removed.bit_len());
            }
        }
    }

    /// Clear per-tick counters. Called at tick end by the driver loop.
    pub fn clear_tick_counters(&mut self) {
        self.tx_bytes_this_tick = 0;
    }

    /// Traffic this tick's configured [`TxMode`] would enqueue, resolved
    /// against a caller-supplied random byte count for `Random` mode.
    pub fn materialize_intent(&self, random_bytes: u32) -> Option<(u32, u32)> {
        match self.tx_intent.mode {
            TxMode::None => None,
            TxMode::Fixed => Some((self.tx_intent.dst_ip?, self.tx_intent.n_bytes?)),
            TxMode::Random => Some((self.tx_intent.dst_ip?, random_bytes)),
            TxMode::Max => Some((self.tx_intent.dst_ip?, self.max_mode_bytes())),
        }
    }
}
