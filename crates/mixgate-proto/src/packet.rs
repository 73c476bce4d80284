//! Packet types carried inside mix-net frames

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Packet kinds within a data stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketType {
    /// Opens a stream
    Start,
    /// Carries payload bytes
    Data,
    /// Closes a stream after a clean EOF
    End,
    /// Closes a stream after a failed ingress read
    Error,
    /// Filler emitted when no real data is queued
    Dummy,
}

/// Header preceding the payload in every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketHeader {
    pub packet_type: PacketType,
    /// Names the originating ingress connection; 0 is reserved.
    /// For dummies, carries the client id instead.
    pub stream_id: u64,
    /// Per-stream counter: 0 on Start, incremented on every frame
    pub sequence: u64,
}

impl PacketHeader {
    pub fn new(packet_type: PacketType, stream_id: u64, sequence: u64) -> Self {
        Self {
            packet_type,
            stream_id,
            sequence,
        }
    }

    /// Round-unique key used for duplicate detection.
    ///
    /// A tuple rather than a sum of the fields: distinct streams must never
    /// collide on the key.
    pub fn uid(&self) -> (u64, u64) {
        (self.stream_id, self.sequence)
    }

    pub fn is_dummy(&self) -> bool {
        self.packet_type == PacketType::Dummy
    }

    /// End and Error both terminate a stream
    pub fn is_terminal(&self) -> bool {
        matches!(self.packet_type, PacketType::End | PacketType::Error)
    }
}

/// A decoded packet: header plus payload with padding stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(header: PacketHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }
}

/// Sort packets by (stream_id, sequence) ascending.
///
/// Within one round this restores per-stream emission order after the
/// mix-net has shuffled the batch.
pub fn sort_packets(packets: &mut [Packet]) {
    packets.sort_by_key(|p| (p.header.stream_id, p.header.sequence));
}
