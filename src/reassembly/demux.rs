//! Routing raw datagrams to the engine for their stream kind

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::network::session::PacketHandler;
use crate::protocol::{parse_header, StreamKind};
use crate::reassembly::clock::{SharedClock, SystemClock};
use crate::reassembly::engine::{ReassemblyEngine, ReassemblyStats};
use crate::reassembly::queue::ReadyQueue;

/// Image and audio engines sharing one transport
pub struct MediaDemux {
    image: ReassemblyEngine,
    audio: ReassemblyEngine,
}

impl MediaDemux {
    /// Create both engines; returns the image and audio ready queues
    pub fn new(expiry: Duration) -> (Self, ReadyQueue, ReadyQueue) {
        Self::with_clock(expiry, Arc::new(SystemClock))
    }

    pub fn with_clock(expiry: Duration, clock: SharedClock) -> (Self, ReadyQueue, ReadyQueue) {
        let (image, image_queue) = ReassemblyEngine::with_clock(StreamKind::Image, expiry, clock.clone());
        let (audio, audio_queue) = ReassemblyEngine::with_clock(StreamKind::Audio, expiry, clock);
        (Self { image, audio }, image_queue, audio_queue)
    }

    /// Dispatch one datagram; unknown or short datagrams are dropped
    pub fn handle_datagram(&self, datagram: &[u8], source: SocketAddr) {
        match parse_header(datagram).map(|h| h.stream_kind) {
            Ok(StreamKind::Image) => self.image.accept_fragment(datagram),
            Ok(StreamKind::Audio) => self.audio.accept_fragment(datagram),
            Ok(other) => {
                tracing::trace!("Ignoring {} datagram from {}", other, source);
            }
            Err(e) => {
                tracing::trace!("Ignoring datagram from {}: {}", source, e);
            }
        }
    }

    /// Sweep stale partial frames in both engines
    pub fn evict_expired(&self) -> usize {
        self.image.evict_expired() + self.audio.evict_expired()
    }

    pub fn engine(&self, kind: StreamKind) -> Option<&ReassemblyEngine> {
        match kind {
            StreamKind::Image => Some(&self.image),
            StreamKind::Audio => Some(&self.audio),
            StreamKind::Unknown(_) => None,
        }
    }

    pub fn image_stats(&self) -> ReassemblyStats {
        self.image.stats()
    }

    pub fn audio_stats(&self) -> ReassemblyStats {
        self.audio.stats()
    }

    /// Wrap the demux as a transport receive callback
    pub fn into_handler(self: Arc<Self>) -> PacketHandler {
        Arc::new(move |datagram: &[u8], source: SocketAddr| self.handle_datagram(datagram, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::fragment;

    fn source() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn test_routes_by_kind() {
        let (demux, images, audio) = MediaDemux::new(Duration::from_secs(2));

        let image_packets = fragment(&[7u8; 3000], 1, StreamKind::Image, 1200).unwrap();
        let audio_packets = fragment(&[3u8; 1500], 1, StreamKind::Audio, 1200).unwrap();

        // Same frame id on both streams, interleaved
        for (a, b) in image_packets.iter().zip(audio_packets.iter()) {
            demux.handle_datagram(a, source());
            demux.handle_datagram(b, source());
        }
        demux.handle_datagram(&image_packets[2], source());

        assert_eq!(images.try_pop().unwrap(), vec![7u8; 3000]);
        assert_eq!(audio.try_pop().unwrap(), vec![3u8; 1500]);
        assert_eq!(demux.image_stats().frames_completed, 1);
        assert_eq!(demux.audio_stats().frames_completed, 1);
    }

    #[test]
    fn test_unknown_kind_ignored() {
        let (demux, images, audio) = MediaDemux::new(Duration::from_secs(2));
        let packets = fragment(b"noise", 1, StreamKind::Unknown(7), 1200).unwrap();

        demux.handle_datagram(&packets[0], source());
        demux.handle_datagram(&[0u8; 4], source());

        assert!(images.is_empty());
        assert!(audio.is_empty());
        assert!(demux.engine(StreamKind::Unknown(7)).is_none());
    }
}
