//! Gateway Packet Protocol
//!
//! This crate defines the packet types carried through the mix-net and the
//! fixed-size frame codec that packs exactly one packet into each uniform
//! mix-net message.

pub mod frame;
pub mod packet;

pub use frame::{FrameCodec, PacketError};
pub use packet::{sort_packets, Packet, PacketHeader, PacketType};

/// Reserved stream id; never names a real ingress stream
pub const RESERVED_STREAM_ID: u64 = 0;
