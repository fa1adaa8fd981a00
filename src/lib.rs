//! # LAN Media Link
//!
//! Low-latency audio, image and chat streaming between two endpoints.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────── SENDING PEER ───────────────────────────────┐
//! │  ┌─────────────┐                         ┌─────────────┐                     │
//! │  │ Microphone  │                         │   Camera    │                     │
//! │  └──────┬──────┘                         └──────┬──────┘                     │
//! │         ▼ mono PCM16 (codec::pcm)               ▼ JPEG (codec::image)        │
//! │  ┌─────────────────────────────────────────────────────────────────────┐    │
//! │  │        MediaSender (network::sender) - frame ids per stream kind    │    │
//! │  │        protocol::fragment -> [FrameId|Index|Count|Kind|000|slice]    │    │
//! │  └─────────────────────────────────┬───────────────────────────────────┘    │
//! │  ┌─────────────────────────────────▼───────────────────────────────────┐    │
//! │  │         DatagramSession (network::session) - single UDP socket      │    │
//! │  └─────────────────────────────────┬───────────────────────────────────┘    │
//! └────────────────────────────────────┼────────────────────────────────────────┘
//!                                      │ UDP (lossy, unordered)
//! ┌────────────────────────────────────┼─────── RECEIVING PEER ─────────────────┐
//! │  ┌─────────────────────────────────▼───────────────────────────────────┐    │
//! │  │      DatagramSession receive loop -> MediaDemux (by stream kind)    │    │
//! │  └──────────────┬──────────────────────────────────────┬───────────────┘    │
//! │                 ▼                                      ▼                    │
//! │  ┌──────────────────────────┐            ┌──────────────────────────┐      │
//! │  │ ReassemblyEngine (image) │            │ ReassemblyEngine (audio) │      │
//! │  └────────────┬─────────────┘            └────────────┬─────────────┘      │
//! │               ▼ ReadyQueue                            ▼ ReadyQueue         │
//! │  ┌──────────────────────────┐            ┌──────────────────────────┐      │
//! │  │  ImageFeed (video)       │            │ JitterBuffer + resampler │      │
//! │  │  latest decoded frame    │            │ pulled by AudioPlayback  │      │
//! │  └──────────────────────────┘            └──────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod chat;
pub mod codec;
pub mod config;
pub mod error;
pub mod network;
pub mod protocol;
pub mod reassembly;
pub mod video;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default sample rate of PCM16 audio on the wire
    pub const DEFAULT_INPUT_SAMPLE_RATE: u32 = 16000;

    /// Default playback sample rate
    pub const DEFAULT_OUTPUT_SAMPLE_RATE: u32 = 48000;

    /// Default playback channel count (stereo)
    pub const DEFAULT_OUTPUT_CHANNELS: u16 = 2;

    /// Default audio frame size in milliseconds
    pub const DEFAULT_FRAME_SIZE_MS: u32 = 20;

    /// Default jitter buffer length in seconds
    pub const DEFAULT_BUFFER_SECONDS: u32 = 2;

    /// Default UDP port for media streaming
    pub const DEFAULT_UDP_PORT: u16 = 5000;

    /// Default TCP port for chat
    pub const DEFAULT_CHAT_PORT: u16 = 5001;

    /// Default maximum datagram size, header included
    pub const DEFAULT_MTU: usize = 1200;

    /// Age after which an incomplete frame is discarded
    pub const FRAME_EXPIRY_MS: u64 = 2000;

    /// Receive buffer large enough for any UDP datagram
    pub const MAX_DATAGRAM_SIZE: usize = 65536;
}
