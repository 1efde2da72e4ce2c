//! IPv4-shaped packet codec and the in-flight packet record.
//!
//! The frame is ceremonial: the simulator never interprets payload bytes,
//! and there is no real routing by address class or TTL decrement. What
//! matters is that the layout is byte-exact and the checksum is real, so
//! tests can assert on wire shape the same way they would against a real
//! stack.

use cellnet_core::{Error, Result, BROADCAST_IP};

/// Fixed IPv4 header length in bytes (no options).
pub const HEADER_LEN: usize = 20;

/// Largest payload a single fragment may carry: the IPv4 total-length
/// field is 16 bits, so `65535 - HEADER_LEN` is the ceiling even before
/// options are considered.
pub const MAX_FRAGMENT_SIZE: usize = 65535 - HEADER_LEN;

const VERSION: u8 = 4;
const DEFAULT_TTL: u8 = 64;
/// Placeholder protocol number; not an IANA-assigned value, since nothing
/// in this simulator speaks a real upper-layer protocol.
const PROTOCOL_SIMULATION: u8 = 99;

/// The kind of payload a [`Packet`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Data,
    Ack,
}

/// A decoded IPv4 header, returned by [`decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub ihl: u8,
    pub total_length: u16,
    pub identification: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub src_ip: u32,
    pub dst_ip: u32,
}

/// One's-complement sum of 16-bit big-endian words, folded and complemented.
/// `words` is assumed to already contain the checksum field zeroed out.
fn ones_complement_checksum(words: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut iter = words.chunks_exact(2);
    for chunk in &mut iter {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
    }
    if let [last] = iter.remainder() {
        sum += u16::from_be_bytes([*last, 0]) as u32;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Build an IPv4-shaped frame around `payload`, with no options. Returns
/// the assembled header+payload bytes.
pub fn encode(src_ip: u32, dst_ip: u32, identification: u16, payload: &[u8]) -> Vec<u8> {
    let ihl: u8 = 5; // no options: header is exactly 5 32-bit words
    let total_length = (ihl as usize * 4 + payload.len()).min(u16::MAX as usize) as u16;

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.push((VERSION << 4) | ihl);
    frame.push(0); // DSCP/ECN, unused
    frame.extend_from_slice(&total_length.to_be_bytes());
    frame.extend_from_slice(&identification.to_be_bytes());
    frame.extend_from_slice(&0u16.to_be_bytes()); // flags/fragment offset
    frame.push(DEFAULT_TTL);
    frame.push(PROTOCOL_SIMULATION);
    frame.extend_from_slice(&0u16.to_be_bytes()); // checksum placeholder
    frame.extend_from_slice(&src_ip.to_be_bytes());
    frame.extend_from_slice(&dst_ip.to_be_bytes());
    debug_assert_eq!(frame.len(), HEADER_LEN);

    let checksum = ones_complement_checksum(&frame[..HEADER_LEN]);
    frame[10..12].copy_from_slice(&checksum.to_be_bytes());

    frame.extend_from_slice(payload);
    frame
}

/// Parse the header out of a frame built by [`encode`]. Validated only for
/// length sanity, per the simulator's treatment of payload as opaque.
pub fn decode(frame: &[u8]) -> Result<(Ipv4Header, &[u8])> {
    if frame.len() < HEADER_LEN {
        return Err(Error::protocol("frame shorter than IPv4 header"));
    }
    let ihl = frame[0] & 0x0F;
    let header_len = ihl as usize * 4;
    if header_len < HEADER_LEN || frame.len() < header_len {
        return Err(Error::protocol("invalid ihl for frame length"));
    }
    let total_length = u16::from_be_bytes([frame[2], frame[3]]);
    let identification = u16::from_be_bytes([frame[4], frame[5]]);
    let ttl = frame[8];
    let protocol = frame[9];
    let checksum = u16::from_be_bytes([frame[10], frame[11]]);
    let src_ip = u32::from_be_bytes([frame[12], frame[13], frame[14], frame[15]]);
    let dst_ip = u32::from_be_bytes([frame[16], frame[17], frame[18], frame[19]]);

    let header = Ipv4Header {
        ihl,
        total_length,
        identification,
        ttl,
        protocol,
        checksum,
        src_ip,
        dst_ip,
    };
    Ok((header, &frame[header_len..]))
}

/// An in-flight packet, carrying its assembled frame alongside the
/// routing metadata the simulator tracks out of band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub t_step: u64,
    pub packet_num: u16,
    pub kind: PacketKind,
    pub bytes: Vec<u8>,
    pub src_ip: u32,
    pub dst_ip: u32,
    pub retx_count: u32,
    pub hop_count: u32,
    pub via_ip: Option<u32>,
}

impl Packet {
    /// Build a DATA packet carrying `payload`, unsent.
    pub fn data(src_ip: u32, dst_ip: u32, packet_num: u16, payload: &[u8], t_step: u64) -> Self {
        Self {
            t_step,
            packet_num,
            kind: PacketKind::Data,
            bytes: encode(src_ip, dst_ip, packet_num, payload),
            src_ip,
            dst_ip,
            retx_count: 0,
            hop_count: 0,
            via_ip: None,
        }
    }

    /// Build an ACK for a received DATA packet, swapping src/dst and
    /// mirroring `packet_num`. The payload is a single byte, per §4.6.
    pub fn ack_for(data: &Packet) -> Self {
        Self {
            t_step: data.t_step,
            packet_num: data.packet_num,
            kind: PacketKind::Ack,
            bytes: encode(data.dst_ip, data.src_ip, data.packet_num, &[0u8]),
            src_ip: data.dst_ip,
            dst_ip: data.src_ip,
            retx_count: 0,
            hop_count: 0,
            via_ip: None,
        }
    }

    /// Bit length of the assembled frame, used for every budget/threshold
    /// accounting in the simulator.
    pub fn bit_len(&self) -> u64 {
        self.bytes.len() as u64 * 8
    }

    pub fn is_broadcast(&self) -> bool {
        self.dst_ip == BROADCAST_IP
    }
}
