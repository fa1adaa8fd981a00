//! Listener Application
//!
//! Binds the media port, reassembles incoming image and audio frames, plays
//! the audio and keeps the latest image. Replies go to whoever sent last.

use anyhow::Result;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_media_link::{
    audio::{list_devices, preferred_output_format, AudioPlayback, JitterBuffer},
    chat::{ChatConnection, ChatListener},
    codec::JpegCodec,
    config::{AppConfig, BindMode},
    network::DatagramSession,
    reassembly::MediaDemux,
    video::ImageFeed,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting media listener");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let mut config = AppConfig::load_or_default(config_path.as_deref())?;
    config.network.bind_mode = BindMode::Bound;

    println!("\n=== Available Output Devices ===");
    for device in list_devices().iter().filter(|d| d.is_output) {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}{}", device.name, default_marker);
    }
    println!();

    // Follow the device's native format so cpal does not reject the stream
    match preferred_output_format(config.audio.output_device.as_deref()) {
        Ok((rate, channels)) => {
            if (rate, channels) != (config.audio.output_sample_rate, config.audio.output_channels) {
                tracing::info!("Output device prefers {} Hz x{}", rate, channels);
            }
            config.audio.output_sample_rate = rate;
            config.audio.output_channels = channels;
        }
        Err(e) => tracing::warn!("Could not query output format: {}", e),
    }

    // Audio path: ready queue -> jitter buffer -> device callback
    let jitter = Arc::new(JitterBuffer::new(
        config.audio.input_sample_rate,
        config.audio.output_sample_rate,
        config.audio.buffer_seconds,
    ));
    let mut playback = AudioPlayback::new(
        config.audio.output_device.clone(),
        config.audio.output_channels,
        jitter.clone(),
    );
    if let Err(e) = playback.start() {
        tracing::warn!("Audio playback unavailable: {}", e);
    }

    let (demux, image_queue, audio_queue) = MediaDemux::new(config.reassembly.expiry());
    let demux = Arc::new(demux);

    let mut session = DatagramSession::new(config.network.clone(), demux.clone().into_handler());
    session.start().await?;

    let running = Arc::new(AtomicBool::new(true));
    let audio_running = running.clone();
    let audio_jitter = jitter.clone();
    let audio_thread = std::thread::Builder::new()
        .name("audio-frames".to_string())
        .spawn(move || {
            while audio_running.load(Ordering::Relaxed) {
                if let Some(frame) = audio_queue.pop_timeout(Duration::from_millis(100)) {
                    audio_jitter.on_frame_arrived(&frame);
                }
            }
        })?;

    // Chat: echo every message back to its sender
    let chat_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.chat.port));
    match ChatListener::bind(chat_addr).await {
        Ok(listener) => {
            tokio::spawn(async move {
                loop {
                    match listener.accept().await {
                        Ok(conn) => {
                            tokio::spawn(echo_chat(conn));
                        }
                        Err(e) => tracing::warn!("Chat accept failed: {}", e),
                    }
                }
            });
        }
        Err(e) => tracing::warn!("Chat unavailable: {}", e),
    }

    let mut images = ImageFeed::new(image_queue, Arc::new(JpegCodec::default()));
    let mut render_tick = tokio::time::interval(Duration::from_millis(33));
    let mut stats_tick = tokio::time::interval(Duration::from_secs(5));

    tracing::info!("Waiting for media on port {}", config.network.local_port);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = render_tick.tick() => {
                if images.poll() {
                    if let Some(image) = images.latest() {
                        tracing::debug!("Showing {}x{} image", image.width, image.height);
                    }
                }
            }
            _ = stats_tick.tick() => {
                demux.evict_expired();

                let net = session.stats();
                let image_stats = demux.image_stats();
                let audio_stats = demux.audio_stats();
                let jitter_stats = jitter.stats();
                tracing::info!(
                    "Network: {} packets, {} bytes received, peer {:?}",
                    net.packets_received,
                    net.bytes_received,
                    session.learned_remote()
                );
                tracing::info!(
                    "Images: {} complete, {} expired, {} shown | Audio: {} complete, {} expired",
                    image_stats.frames_completed,
                    image_stats.frames_expired,
                    images.frames_shown(),
                    audio_stats.frames_completed,
                    audio_stats.frames_expired
                );
                tracing::info!(
                    "Jitter buffer: {:.1}% full, {} overflowed, {} underrun frames",
                    jitter_stats.fill_level() * 100.0,
                    jitter_stats.overflowed_samples,
                    jitter_stats.underrun_frames
                );
                if let Some(e) = playback.check_errors() {
                    tracing::warn!("Playback error: {}", e);
                }
            }
        }
    }

    tracing::info!("Shutting down");
    running.store(false, Ordering::Relaxed);
    session.stop();
    playback.stop();
    let _ = audio_thread.join();
    Ok(())
}

async fn echo_chat(mut conn: ChatConnection) {
    let peer = conn.peer_addr();
    loop {
        match conn.recv().await {
            Ok(Some(message)) => {
                tracing::info!("[chat {}] {}", peer, message.trim_end());
                if let Err(e) = conn.send(&message).await {
                    tracing::warn!("Chat send to {} failed: {}", peer, e);
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Chat receive from {} failed: {}", peer, e);
                break;
            }
        }
    }
    tracing::info!("Chat with {} closed", peer);
}
