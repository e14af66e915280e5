use tokio_util::bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::error::CodecError;
use crate::identity::{InfoHash, PeerId};

const PROTOCOL_IDENTIFIER_LENGTH: u8 = 19;
const PROTOCOL_IDENTIFIER: [u8; 19] = *b"BitTorrent protocol";
pub(crate) const HANDSHAKE_MESSAGE_LENGTH: usize = 68;

/// Capability bits carried in the reserved section of the handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Capabilities(u64);

impl Capabilities {
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u64 {
        self.0
    }

    pub const fn contains(&self, other: Capabilities) -> bool {
        self.0 & other.0 == other.0
    }
}

/// The frame each side sends before anything else:
///
/// ```text
/// [19]["BitTorrent protocol"][8 capability bytes][20 info hash][20 peer id]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeMessage {
    pub capabilities: Capabilities,
    pub info_hash: InfoHash,
    pub peer_id: PeerId,
}

impl HandshakeMessage {
    pub fn new(info_hash: InfoHash, peer_id: PeerId) -> Self {
        Self {
            capabilities: Capabilities::default(),
            info_hash,
            peer_id,
        }
    }
}

/// Frames exactly one [`HandshakeMessage`]. Bytes after the frame are left in
/// the buffer for whoever reads the stream next.
#[derive(Debug, Default, Clone, Copy)]
pub struct HandshakeCodec;

impl Encoder<HandshakeMessage> for HandshakeCodec {
    type Error = CodecError;

    fn encode(&mut self, item: HandshakeMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(HANDSHAKE_MESSAGE_LENGTH);
        dst.put_u8(PROTOCOL_IDENTIFIER_LENGTH);
        dst.put_slice(&PROTOCOL_IDENTIFIER);
        dst.put_u64(item.capabilities.bits());
        dst.put_slice(item.info_hash.as_bytes());
        dst.put_slice(item.peer_id.as_bytes());
        Ok(())
    }
}

impl Decoder for HandshakeCodec {
    type Item = HandshakeMessage;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Reject a wrong prefix as soon as it arrives instead of waiting for a
        // full frame that may never come.
        let prefix = src.len().min(1 + PROTOCOL_IDENTIFIER.len());
        if prefix > 0 && src[0] != PROTOCOL_IDENTIFIER_LENGTH {
            return Err(CodecError::InvalidProtocol);
        }
        if prefix > 1 && src[1..prefix] != PROTOCOL_IDENTIFIER[..prefix - 1] {
            return Err(CodecError::InvalidProtocol);
        }

        if src.len() < HANDSHAKE_MESSAGE_LENGTH {
            return Ok(None);
        }

        let mut frame = src.split_to(HANDSHAKE_MESSAGE_LENGTH);
        frame.advance(1 + PROTOCOL_IDENTIFIER.len());
        let capabilities = Capabilities::from_bits(frame.get_u64());
        let info_hash = InfoHash::from_bytes(&frame[..20])
            .map_err(|_| CodecError::InvalidProtocol)?;
        let peer_id = PeerId::from_bytes(&frame[20..40])
            .map_err(|_| CodecError::InvalidProtocol)?;

        Ok(Some(HandshakeMessage {
            capabilities,
            info_hash,
            peer_id,
        }))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(message) => Ok(Some(message)),
            None if buf.is_empty() => Ok(None),
            None => Err(CodecError::Truncated { len: buf.len() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> HandshakeMessage {
        HandshakeMessage {
            capabilities: Capabilities::from_bits(0x10),
            info_hash: InfoHash::new([1; 20]),
            peer_id: PeerId::new([2; 20]),
        }
    }

    #[test]
    fn test_handshake_message_layout() {
        let mut bytes = BytesMut::new();
        HandshakeCodec.encode(message(), &mut bytes).unwrap();

        assert_eq!(bytes.len(), HANDSHAKE_MESSAGE_LENGTH);
        assert_eq!(bytes[0], PROTOCOL_IDENTIFIER_LENGTH);
        assert_eq!(&bytes[1..20], PROTOCOL_IDENTIFIER);
        assert_eq!(&bytes[20..28], &[0, 0, 0, 0, 0, 0, 0, 0x10]);
        assert_eq!(&bytes[28..48], &[1; 20]);
        assert_eq!(&bytes[48..68], &[2; 20]);
    }

    #[test]
    fn test_decode_leaves_trailing_bytes() {
        let mut bytes = BytesMut::new();
        HandshakeCodec.encode(message(), &mut bytes).unwrap();
        bytes.extend_from_slice(b"piece");

        let decoded = HandshakeCodec.decode(&mut bytes).unwrap();
        assert_eq!(decoded, Some(message()));
        assert_eq!(&bytes[..], b"piece");
    }

    #[test]
    fn test_incomplete_buffer() {
        let mut bytes = BytesMut::new();
        HandshakeCodec.encode(message(), &mut bytes).unwrap();
        let mut partial = bytes.split_to(30);

        assert!(HandshakeCodec.decode(&mut partial).unwrap().is_none());
        assert_eq!(partial.len(), 30);
    }

    #[test]
    fn test_invalid_protocol_fails_early() {
        let mut bytes = BytesMut::from(&[19u8, b'X', b'Y'][..]);
        assert!(matches!(
            HandshakeCodec.decode(&mut bytes),
            Err(CodecError::InvalidProtocol)
        ));

        let mut bytes = BytesMut::from(&[4u8][..]);
        assert!(matches!(
            HandshakeCodec.decode(&mut bytes),
            Err(CodecError::InvalidProtocol)
        ));
    }

    #[test]
    fn test_truncated_at_eof() {
        let mut bytes = BytesMut::new();
        HandshakeCodec.encode(message(), &mut bytes).unwrap();
        let mut partial = bytes.split_to(40);

        assert!(matches!(
            HandshakeCodec.decode_eof(&mut partial),
            Err(CodecError::Truncated { len: 40 })
        ));
        assert!(HandshakeCodec.decode_eof(&mut BytesMut::new()).unwrap().is_none());
    }

    #[test]
    fn test_capabilities_contains() {
        let caps = Capabilities::from_bits(0b1010);
        assert!(caps.contains(Capabilities::from_bits(0b1000)));
        assert!(!caps.contains(Capabilities::from_bits(0b0001)));
    }
}
