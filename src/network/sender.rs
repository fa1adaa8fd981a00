//! Frame sender
//!
//! Assigns frame ids per stream kind, fragments each frame to the MTU and
//! hands every fragment to the datagram session.

use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

use crate::error::ProtocolError;
use crate::network::session::DatagramSender;
use crate::protocol::{fragment, StreamKind};

/// Sends image and audio frames over one datagram session
pub struct MediaSender {
    sender: DatagramSender,
    mtu: usize,
    next_image_id: AtomicI32,
    next_audio_id: AtomicI32,
    frames_sent: AtomicU64,
    fragments_sent: AtomicU64,
}

impl MediaSender {
    pub fn new(sender: DatagramSender, mtu: usize) -> Self {
        Self {
            sender,
            mtu,
            next_image_id: AtomicI32::new(0),
            next_audio_id: AtomicI32::new(0),
            frames_sent: AtomicU64::new(0),
            fragments_sent: AtomicU64::new(0),
        }
    }

    /// Fragment and send one frame.
    ///
    /// Returns the frame id used, or `None` for an empty payload, which is
    /// not sent at all.
    pub fn send_frame(&self, kind: StreamKind, payload: &[u8]) -> Result<Option<i32>, ProtocolError> {
        let counter = match kind {
            StreamKind::Image => &self.next_image_id,
            StreamKind::Audio => &self.next_audio_id,
            StreamKind::Unknown(tag) => {
                return Err(ProtocolError::InvalidParameter(format!("cannot send stream kind {}", tag)))
            }
        };

        if payload.is_empty() {
            return Ok(None);
        }

        // fetch_add wraps on overflow
        let frame_id = counter.fetch_add(1, Ordering::Relaxed);
        let packets = fragment(payload, frame_id, kind, self.mtu)?;
        let count = packets.len() as u64;

        for packet in packets {
            self.sender.send(packet);
        }

        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.fragments_sent.fetch_add(count, Ordering::Relaxed);
        Ok(Some(frame_id))
    }

    /// Send an encoded image
    pub fn send_image(&self, encoded: &[u8]) -> Result<Option<i32>, ProtocolError> {
        self.send_frame(StreamKind::Image, encoded)
    }

    /// Send a block of PCM16 little-endian samples
    pub fn send_audio(&self, pcm16: &[u8]) -> Result<Option<i32>, ProtocolError> {
        self.send_frame(StreamKind::Audio, pcm16)
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    pub fn fragments_sent(&self) -> u64 {
        self.fragments_sent.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::network::session::{DatagramSession, PacketHandler};
    use crate::reassembly::ReassemblyEngine;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_frames_cross_the_wire() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();

        let handler: PacketHandler = Arc::new(|_: &[u8], _: std::net::SocketAddr| {});
        let mut session = DatagramSession::new(NetworkConfig::peer("127.0.0.1", port), handler);
        session.start().await.unwrap();

        let sender = MediaSender::new(session.sender(), 600);
        let image: Vec<u8> = (0..4000u32).map(|i| (i % 256) as u8).collect();

        assert_eq!(sender.send_image(&image).unwrap(), Some(0));
        assert_eq!(sender.send_audio(&[1, 0, 2, 0]).unwrap(), Some(0));
        assert_eq!(sender.send_image(&[]).unwrap(), None);
        assert_eq!(sender.frames_sent(), 2);

        let (images, image_queue) = ReassemblyEngine::new(StreamKind::Image);
        let (audio, audio_queue) = ReassemblyEngine::new(StreamKind::Audio);

        let expected = sender.fragments_sent();
        let mut buf = vec![0u8; 2048];
        for _ in 0..expected {
            let (len, _) = timeout(Duration::from_secs(2), receiver.recv_from(&mut buf))
                .await
                .expect("timed out")
                .unwrap();
            assert!(len <= 600);
            images.accept_fragment(&buf[..len]);
            audio.accept_fragment(&buf[..len]);
        }

        assert_eq!(image_queue.try_pop().unwrap(), image);
        assert_eq!(audio_queue.try_pop().unwrap(), vec![1u8, 0, 2, 0]);
    }

    #[tokio::test]
    async fn test_unknown_kind_rejected() {
        let handler: PacketHandler = Arc::new(|_: &[u8], _: std::net::SocketAddr| {});
        let session = DatagramSession::new(NetworkConfig::default(), handler);
        let sender = MediaSender::new(session.sender(), 1200);

        assert!(sender.send_frame(StreamKind::Unknown(3), b"x").is_err());
    }
}
