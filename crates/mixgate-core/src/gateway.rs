//! The gateway value and its mix-net hooks

use std::collections::HashSet;

use bytes::Bytes;
use tracing::{debug, warn};

use mixgate_proto::{sort_packets, FrameCodec, Packet, PacketHeader, PacketType};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::queue::MessageQueue;
use crate::streams::StreamTable;

/// Shared gateway state, one per process.
///
/// Owns the frame codec, the ingress queue staged for mix-net pickup, and
/// the egress stream table. The two hook methods are synchronous and take
/// only short critical sections, so the mix-net may call them from any
/// thread.
pub struct Gateway {
    config: GatewayConfig,
    codec: FrameCodec,
    ingress: MessageQueue,
    streams: StreamTable,
}

impl Gateway {
    /// Validate the configuration and build the gateway state.
    ///
    /// Fails fast when the message size cannot hold the packet protocol.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let codec = FrameCodec::new(config.message_size)?;

        Ok(Self {
            config,
            codec,
            ingress: MessageQueue::new(),
            streams: StreamTable::new(),
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }

    /// Outbound streams leaving the mix-net
    pub fn streams(&self) -> &StreamTable {
        &self.streams
    }

    /// Frames currently staged for mix-net pickup
    pub fn ingress_len(&self) -> usize {
        self.ingress.len()
    }

    /// Payload capacity of one frame
    pub fn max_data_size(&self) -> usize {
        self.codec.max_data_size()
    }

    /// Worst-case header plus length-field overhead of one frame
    pub fn max_protocol_size(&self) -> usize {
        self.codec.max_protocol_size()
    }

    /// Pack a packet and stage it for a mix-net client to pick up
    pub fn submit_packet(&self, header: &PacketHeader, data: &[u8]) -> Result<(), GatewayError> {
        let frame = self.codec.pack(header, data)?;
        debug!(
            "Staging {:?} packet for stream {} (seq {}, {} bytes)",
            header.packet_type,
            header.stream_id,
            header.sequence,
            data.len()
        );
        self.ingress.enqueue(frame);
        Ok(())
    }

    /// The next message for a mix-net client to send this round.
    ///
    /// Non-blocking: when the ingress queue is empty a dummy frame is
    /// synthesized carrying the client id as its stream id, so dummies for
    /// distinct clients stay distinguishable within a round. The returned
    /// frame always has the configured message size.
    pub fn next_client_message(&self, client_id: u64) -> Result<Bytes, GatewayError> {
        if let Some(frame) = self.ingress.dequeue() {
            return Ok(frame);
        }

        let dummy = PacketHeader::new(PacketType::Dummy, client_id, 0);
        Ok(self.codec.pack(&dummy, &[])?)
    }

    /// Consume the batch of final messages that completed a mix-net round.
    ///
    /// The mix-net is observed to deliver duplicates, so the batch is first
    /// deduplicated by (stream_id, sequence). Dummies count toward the
    /// unique total and are then discarded; real packets are applied to the
    /// stream table in (stream_id, sequence) order. Returns true iff the
    /// number of unique messages equals `num_expected`.
    pub fn check_final_messages(&self, messages: &[Vec<u8>], num_expected: usize) -> bool {
        let mut seen = HashSet::new();
        let mut packets: Vec<Packet> = Vec::new();

        for message in messages {
            let packet = match self.codec.unpack(message) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!("Dropping malformed frame from round: {}", e);
                    continue;
                }
            };

            if !seen.insert(packet.header.uid()) {
                continue;
            }
            if !packet.header.is_dummy() {
                packets.push(packet);
            }
        }

        sort_packets(&mut packets);

        for packet in &packets {
            debug!(
                "Data exiting mix-net: stream {} seq {} ({} bytes)",
                packet.header.stream_id,
                packet.header.sequence,
                packet.payload.len()
            );
            self.streams.apply(packet);
        }

        seen.len() == num_expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streams::StreamPhase;

    fn test_gateway(message_size: usize) -> Gateway {
        let config = GatewayConfig::from_parts(
            message_size,
            false,
            "127.0.0.1:0",
            "127.0.0.1:0",
        )
        .unwrap();
        Gateway::new(config).unwrap()
    }

    #[test]
    fn test_new_rejects_too_small_message_size() {
        let config = GatewayConfig::from_parts(8, false, "127.0.0.1:0", "127.0.0.1:0").unwrap();
        assert!(Gateway::new(config).is_err());
    }

    #[test]
    fn test_next_client_message_returns_staged_frame() {
        let gateway = test_gateway(256);
        let header = PacketHeader::new(PacketType::Data, 5, 3);
        gateway.submit_packet(&header, b"payload").unwrap();

        let frame = gateway.next_client_message(1).unwrap();
        assert_eq!(frame.len(), 256);

        let packet = gateway.codec().unpack(&frame).unwrap();
        assert_eq!(packet.header, header);
        assert_eq!(packet.payload.as_ref(), b"payload");
    }

    #[test]
    fn test_empty_queue_synthesizes_dummy() {
        let gateway = test_gateway(256);

        let frame = gateway.next_client_message(17).unwrap();
        assert_eq!(frame.len(), 256);

        let packet = gateway.codec().unpack(&frame).unwrap();
        assert_eq!(packet.header.packet_type, PacketType::Dummy);
        assert_eq!(packet.header.stream_id, 17);
        assert_eq!(packet.header.sequence, 0);
        assert!(packet.payload.is_empty());
    }

    #[test]
    fn test_dummies_for_distinct_clients_differ() {
        let gateway = test_gateway(256);

        let a = gateway.next_client_message(1).unwrap();
        let b = gateway.next_client_message(2).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_check_final_counts_unique_messages() {
        let gateway = test_gateway(256);

        // uids (1,0), (1,0), (2,0), (3,0): three unique
        let frames: Vec<Vec<u8>> = [1u64, 1, 2, 3]
            .iter()
            .map(|&id| {
                gateway
                    .codec()
                    .pack(&PacketHeader::new(PacketType::Dummy, id, 0), &[])
                    .unwrap()
                    .to_vec()
            })
            .collect();

        assert!(gateway.check_final_messages(&frames, 3));
        assert!(!gateway.check_final_messages(&frames, 4));
    }

    #[test]
    fn test_check_final_drops_malformed_frames() {
        let gateway = test_gateway(256);

        let good = gateway
            .codec()
            .pack(&PacketHeader::new(PacketType::Dummy, 1, 0), &[])
            .unwrap()
            .to_vec();
        let garbage = vec![0xffu8; 256];

        assert!(gateway.check_final_messages(&[good, garbage], 1));
    }

    #[test]
    fn test_round_rebuilds_stream_in_order() {
        let gateway = test_gateway(256);
        let stream_id = 99;

        // frames deliberately supplied out of order, with duplicates
        let mk = |packet_type, sequence, data: &[u8]| {
            gateway
                .codec()
                .pack(&PacketHeader::new(packet_type, stream_id, sequence), data)
                .unwrap()
                .to_vec()
        };
        let batch = vec![
            mk(PacketType::End, 3, b""),
            mk(PacketType::Data, 2, b" world"),
            mk(PacketType::Data, 1, b"hello"),
            mk(PacketType::Data, 1, b"hello"),
            mk(PacketType::Start, 0, b""),
        ];

        assert!(gateway.check_final_messages(&batch, 4));
        assert_eq!(gateway.streams().phase(stream_id), Some(StreamPhase::Ended));

        let claimed = gateway.streams().try_claim().unwrap();
        assert_eq!(claimed.queue.dequeue().unwrap().as_ref(), b"hello");
        assert_eq!(claimed.queue.dequeue().unwrap().as_ref(), b" world");
        assert_eq!(claimed.queue.dequeue(), None);
    }
}
