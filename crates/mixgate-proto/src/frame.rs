//! Fixed-size frame codec
//!
//! Every mix-net message is one frame of exactly the configured message size:
//!
//! ```text
//! header_len: u16 LE || header_bytes || data_len: u32 LE || data_bytes || zero padding
//! ```
//!
//! The length fields live in the frame rather than only in the header so the
//! payload can be copied straight into the frame buffer, and so the header
//! encoding stays opaque to this layer.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::packet::{Packet, PacketHeader, PacketType};

/// Codec errors
#[derive(Debug, Error)]
pub enum PacketError {
    #[error("Message size {message_size} too small: must exceed the {min} byte protocol overhead")]
    MessageSizeTooSmall { message_size: usize, min: usize },

    #[error("Packet too large for message size: {required} > {message_size}")]
    PacketTooLarge {
        required: usize,
        message_size: usize,
    },

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Header encoding failed: {0}")]
    HeaderEncoding(#[from] bincode::Error),
}

/// Packs packets into uniform frames of the mix-net message size.
///
/// The worst-case protocol overhead is measured once at construction by
/// encoding a header with every field at its maximum value.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    message_size: usize,
    max_protocol_size: usize,
}

impl FrameCodec {
    /// Bytes taken by the two in-frame length fields: u16 header_len + u32 data_len
    pub const LENGTH_FIELDS: usize = 6;

    /// Create a codec for the given mix-net message size.
    ///
    /// Fails when the size cannot hold a maximal header plus the length
    /// fields, leaving no room for payload.
    pub fn new(message_size: usize) -> Result<Self, PacketError> {
        let max_header = PacketHeader::new(PacketType::Dummy, u64::MAX, u64::MAX);
        let max_protocol_size =
            bincode::serialized_size(&max_header)? as usize + Self::LENGTH_FIELDS;

        if message_size <= max_protocol_size {
            return Err(PacketError::MessageSizeTooSmall {
                message_size,
                min: max_protocol_size,
            });
        }

        Ok(Self {
            message_size,
            max_protocol_size,
        })
    }

    /// The uniform frame length in bytes
    pub fn message_size(&self) -> usize {
        self.message_size
    }

    /// Worst-case bytes of header plus length fields in a frame
    pub fn max_protocol_size(&self) -> usize {
        self.max_protocol_size
    }

    /// Payload capacity guaranteed to fit alongside any header
    pub fn max_data_size(&self) -> usize {
        self.message_size - self.max_protocol_size
    }

    /// Pack a header and payload into a zero-padded frame of exactly
    /// `message_size` bytes
    pub fn pack(&self, header: &PacketHeader, data: &[u8]) -> Result<Bytes, PacketError> {
        let header_bytes = bincode::serialize(header)?;

        let required = header_bytes.len() + data.len() + Self::LENGTH_FIELDS;
        if required > self.message_size {
            return Err(PacketError::PacketTooLarge {
                required,
                message_size: self.message_size,
            });
        }

        let mut buf = BytesMut::with_capacity(self.message_size);
        buf.put_u16_le(header_bytes.len() as u16);
        buf.put_slice(&header_bytes);
        buf.put_u32_le(data.len() as u32);
        buf.put_slice(data);
        buf.resize(self.message_size, 0);

        Ok(buf.freeze())
    }

    /// Unpack a frame, stripping the trailing padding.
    ///
    /// Fails with [`PacketError::MalformedFrame`] when the header does not
    /// decode or a declared length is inconsistent with the frame.
    pub fn unpack(&self, frame: &[u8]) -> Result<Packet, PacketError> {
        if frame.len() != self.message_size {
            return Err(PacketError::MalformedFrame(format!(
                "frame length {} != message size {}",
                frame.len(),
                self.message_size
            )));
        }

        let mut buf = frame;
        let header_len = buf.get_u16_le() as usize;
        if header_len + Self::LENGTH_FIELDS > self.message_size {
            return Err(PacketError::MalformedFrame(format!(
                "declared header length {} exceeds frame",
                header_len
            )));
        }

        let header: PacketHeader = bincode::deserialize(&buf[..header_len])
            .map_err(|e| PacketError::MalformedFrame(format!("header decode: {}", e)))?;
        buf.advance(header_len);

        let data_len = buf.get_u32_le() as usize;
        if data_len > buf.remaining() {
            return Err(PacketError::MalformedFrame(format!(
                "declared data length {} exceeds frame",
                data_len
            )));
        }

        let payload = Bytes::copy_from_slice(&buf[..data_len]);
        Ok(Packet::new(header, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack_small_payload() {
        let codec = FrameCodec::new(64).unwrap();
        let header = PacketHeader::new(PacketType::Data, 1, 1);

        let frame = codec.pack(&header, b"1").unwrap();
        assert_eq!(frame.len(), 64);

        // everything past the payload is zero padding
        let used = 2 + (frame[0] as usize | (frame[1] as usize) << 8) + 4 + 1;
        assert!(frame[used..].iter().all(|&b| b == 0));

        let packet = codec.unpack(&frame).unwrap();
        assert_eq!(packet.header, header);
        assert_eq!(packet.payload.as_ref(), b"1");
    }

    #[test]
    fn test_pack_empty_payload() {
        let codec = FrameCodec::new(128).unwrap();
        let header = PacketHeader::new(PacketType::Start, 42, 0);

        let frame = codec.pack(&header, &[]).unwrap();
        assert_eq!(frame.len(), 128);

        let packet = codec.unpack(&frame).unwrap();
        assert_eq!(packet.header, header);
        assert!(packet.payload.is_empty());
    }

    #[test]
    fn test_pack_rejects_oversized_packet() {
        // 30 bytes holds a maximal header but not ten payload bytes on top
        let codec = FrameCodec::new(30).unwrap();
        let header = PacketHeader::new(PacketType::Data, u64::MAX, u64::MAX);

        let err = codec.pack(&header, b"1234567890").unwrap_err();
        assert!(matches!(err, PacketError::PacketTooLarge { .. }));
    }

    #[test]
    fn test_pack_fills_to_exact_capacity() {
        let codec = FrameCodec::new(256).unwrap();
        let header = PacketHeader::new(PacketType::Data, u64::MAX, u64::MAX);
        let data = vec![0xab; codec.max_data_size()];

        let frame = codec.pack(&header, &data).unwrap();
        assert_eq!(frame.len(), 256);

        let packet = codec.unpack(&frame).unwrap();
        assert_eq!(packet.payload, data);
    }

    #[test]
    fn test_codec_rejects_too_small_message_size() {
        let min = FrameCodec::new(1024).unwrap().max_protocol_size();

        assert!(matches!(
            FrameCodec::new(min),
            Err(PacketError::MessageSizeTooSmall { .. })
        ));
        assert!(matches!(
            FrameCodec::new(0),
            Err(PacketError::MessageSizeTooSmall { .. })
        ));
        assert!(FrameCodec::new(min + 1).is_ok());
    }

    #[test]
    fn test_max_data_size_accounts_for_protocol() {
        let codec = FrameCodec::new(1024).unwrap();
        assert_eq!(
            codec.max_data_size(),
            codec.message_size() - codec.max_protocol_size()
        );
        assert!(codec.max_data_size() < 1024);
    }

    #[test]
    fn test_unpack_rejects_wrong_frame_length() {
        let codec = FrameCodec::new(64).unwrap();
        let err = codec.unpack(&[0u8; 32]).unwrap_err();
        assert!(matches!(err, PacketError::MalformedFrame(_)));
    }

    #[test]
    fn test_unpack_rejects_header_length_beyond_frame() {
        let codec = FrameCodec::new(64).unwrap();
        let mut frame = vec![0u8; 64];
        frame[0] = 0xff;
        frame[1] = 0xff;

        let err = codec.unpack(&frame).unwrap_err();
        assert!(matches!(err, PacketError::MalformedFrame(_)));
    }

    #[test]
    fn test_unpack_rejects_data_length_beyond_frame() {
        let codec = FrameCodec::new(64).unwrap();
        let header = PacketHeader::new(PacketType::Data, 1, 1);
        let frame = codec.pack(&header, b"x").unwrap();

        // corrupt the data_len field to something absurd
        let mut bad = frame.to_vec();
        let header_len = bad[0] as usize | (bad[1] as usize) << 8;
        let data_len_at = 2 + header_len;
        bad[data_len_at..data_len_at + 4].copy_from_slice(&u32::MAX.to_le_bytes());

        let err = codec.unpack(&bad).unwrap_err();
        assert!(matches!(err, PacketError::MalformedFrame(_)));
    }

    #[test]
    fn test_unpack_rejects_garbage_header() {
        let codec = FrameCodec::new(64).unwrap();
        let mut frame = vec![0u8; 64];
        // plausible header_len but undecodable header bytes
        frame[0] = 20;
        for b in frame[2..22].iter_mut() {
            *b = 0xff;
        }

        let err = codec.unpack(&frame).unwrap_err();
        assert!(matches!(err, PacketError::MalformedFrame(_)));
    }

    #[test]
    fn test_round_trip_preserves_all_header_fields() {
        let codec = FrameCodec::new(512).unwrap();
        for packet_type in [
            PacketType::Start,
            PacketType::Data,
            PacketType::End,
            PacketType::Error,
            PacketType::Dummy,
        ] {
            let header = PacketHeader::new(packet_type, 0xdead_beef_cafe, 7);
            let frame = codec.pack(&header, b"payload").unwrap();
            let packet = codec.unpack(&frame).unwrap();
            assert_eq!(packet.header, header);
            assert_eq!(packet.payload.as_ref(), b"payload");
        }
    }
}
