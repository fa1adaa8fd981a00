//! Fixed-size packet header

use bytes::BufMut;

use crate::error::ProtocolError;

/// Size of the packet header in bytes
pub const HEADER_SIZE: usize = 12;

/// Tag distinguishing the media multiplexed over one transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Encoded image frame
    Image,
    /// PCM16 audio frame
    Audio,
    /// Any tag this build does not know; consumers ignore it
    Unknown(u8),
}

impl StreamKind {
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            1 => StreamKind::Image,
            2 => StreamKind::Audio,
            other => StreamKind::Unknown(other),
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            StreamKind::Image => 1,
            StreamKind::Audio => 2,
            StreamKind::Unknown(tag) => tag,
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, StreamKind::Unknown(_))
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Image => write!(f, "image"),
            StreamKind::Audio => write!(f, "audio"),
            StreamKind::Unknown(tag) => write!(f, "unknown({})", tag),
        }
    }
}

/// Header preceding every fragment on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Frame identifier, scoped per stream kind and per sender
    pub frame_id: i32,
    /// 0-based fragment index
    pub packet_index: u16,
    /// Total fragments of this frame
    pub packet_count: u16,
    /// Stream the frame belongs to
    pub stream_kind: StreamKind,
}

impl PacketHeader {
    pub fn new(frame_id: i32, packet_index: u16, packet_count: u16, stream_kind: StreamKind) -> Self {
        Self {
            frame_id,
            packet_index,
            packet_count,
            stream_kind,
        }
    }

    /// Index lies inside the advertised fragment count
    pub fn is_consistent(&self) -> bool {
        self.packet_index < self.packet_count
    }

    /// Append the 12 header bytes to `buf`
    pub fn write_to<B: BufMut>(&self, buf: &mut B) {
        buf.put_i32_le(self.frame_id);
        buf.put_u16_le(self.packet_index);
        buf.put_u16_le(self.packet_count);
        buf.put_u8(self.stream_kind.tag());
        buf.put_bytes(0, 3);
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        self.write_to(&mut &mut out[..]);
        out
    }
}

/// Read the header at the start of `buffer`.
///
/// The reserved bytes are not validated.
pub fn parse_header(buffer: &[u8]) -> Result<PacketHeader, ProtocolError> {
    let Some((header, _payload)) = buffer.split_first_chunk::<HEADER_SIZE>() else {
        return Err(ProtocolError::Malformed {
            len: buffer.len(),
            needed: HEADER_SIZE,
        });
    };

    Ok(PacketHeader {
        frame_id: i32::from_le_bytes([header[0], header[1], header[2], header[3]]),
        packet_index: u16::from_le_bytes([header[4], header[5]]),
        packet_count: u16::from_le_bytes([header[6], header[7]]),
        stream_kind: StreamKind::from_tag(header[8]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = PacketHeader::new(-2, 3, 7, StreamKind::Audio);
        let bytes = header.to_bytes();

        assert_eq!(&bytes[0..4], &(-2i32).to_le_bytes());
        assert_eq!(&bytes[4..6], &[3, 0]);
        assert_eq!(&bytes[6..8], &[7, 0]);
        assert_eq!(bytes[8], 2);
        assert_eq!(&bytes[9..12], &[0, 0, 0]);
    }

    #[test]
    fn test_parse_header() {
        let mut packet = PacketHeader::new(42, 1, 2, StreamKind::Image).to_bytes().to_vec();
        packet.extend_from_slice(b"payload");

        let header = parse_header(&packet).unwrap();
        assert_eq!(header.frame_id, 42);
        assert_eq!(header.packet_index, 1);
        assert_eq!(header.packet_count, 2);
        assert_eq!(header.stream_kind, StreamKind::Image);
        assert!(header.is_consistent());
    }

    #[test]
    fn test_parse_short_buffer() {
        let err = parse_header(&[0u8; 11]).unwrap_err();
        assert_eq!(err, ProtocolError::Malformed { len: 11, needed: HEADER_SIZE });
    }

    #[test]
    fn test_reserved_bytes_ignored() {
        let mut packet = PacketHeader::new(5, 0, 1, StreamKind::Audio).to_bytes();
        packet[9] = 0xAA;
        packet[11] = 0xFF;

        let header = parse_header(&packet).unwrap();
        assert_eq!(header.frame_id, 5);
        assert_eq!(header.stream_kind, StreamKind::Audio);
    }

    #[test]
    fn test_unknown_kind() {
        let packet = PacketHeader::new(1, 0, 1, StreamKind::Unknown(9)).to_bytes();
        let header = parse_header(&packet).unwrap();
        assert_eq!(header.stream_kind, StreamKind::Unknown(9));
        assert!(!header.stream_kind.is_known());
    }
}
