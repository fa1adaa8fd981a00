//! Splitting frame payloads into datagram-sized fragments

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::protocol::header::{PacketHeader, StreamKind, HEADER_SIZE};

/// Split `raw` into wire packets of at most `mtu` bytes each.
///
/// An empty payload yields no packets; callers treat that as a no-op rather
/// than as a frame.
pub fn fragment(
    raw: &[u8],
    frame_id: i32,
    stream_kind: StreamKind,
    mtu: usize,
) -> Result<Vec<Bytes>, ProtocolError> {
    let chunk_payload = mtu.checked_sub(HEADER_SIZE).filter(|&n| n > 0).ok_or_else(|| {
        ProtocolError::InvalidParameter(format!(
            "mtu {} leaves no room for payload after the {}-byte header",
            mtu, HEADER_SIZE
        ))
    })?;

    let total_packets = raw.len().div_ceil(chunk_payload);
    let packet_count =
        u16::try_from(total_packets).map_err(|_| ProtocolError::PayloadTooLarge(raw.len()))?;

    let packets = raw
        .chunks(chunk_payload)
        .enumerate()
        .map(|(index, chunk)| {
            let mut packet = BytesMut::with_capacity(HEADER_SIZE + chunk.len());
            PacketHeader::new(frame_id, index as u16, packet_count, stream_kind).write_to(&mut packet);
            packet.put_slice(chunk);
            packet.freeze()
        })
        .collect();

    Ok(packets)
}
