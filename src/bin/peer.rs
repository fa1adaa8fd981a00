//! Peer Application
//!
//! Captures the microphone (or synthesises a tone when none is available),
//! sends it with a periodic test image to a listener, and forwards stdin
//! lines over the chat channel.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_media_link::{
    audio::AudioCapture,
    chat::ChatConnection,
    codec::{encode_pcm16, ImageCodec, JpegCodec, RawImage},
    config::{AppConfig, AudioConfig, BindMode},
    network::{DatagramSession, MediaSender, PacketHandler},
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

    tracing::info!("Starting media peer");

    // Target from args, e.g. "192.168.1.20:5000"
    let target = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:5000".to_string());
    let (host, port) = target
        .rsplit_once(':')
        .context("target must be host:port")?;
    let port: u16 = port.parse().context("invalid target port")?;

    let config_path = std::env::args().nth(2).map(PathBuf::from);
    let mut config = AppConfig::load_or_default(config_path.as_deref())?;
    config.network.bind_mode = BindMode::Unbound;
    config.network.remote_address = Some(host.trim_matches(['[', ']']).to_string());
    config.network.remote_port = port;

    tracing::info!("Target listener: {}", target);

    let handler: PacketHandler = Arc::new(|datagram: &[u8], source: SocketAddr| {
        tracing::trace!("{} byte datagram from {}", datagram.len(), source);
    });
    let mut session = DatagramSession::new(config.network.clone(), handler);
    session.start().await?;

    let sender = Arc::new(MediaSender::new(session.sender(), config.network.mtu));

    // Audio: microphone frames, or a synthetic tone
    let mut capture = AudioCapture::new(
        config.audio.input_device.clone(),
        config.audio.input_sample_rate,
        config.audio.samples_per_frame(),
    );
    match capture.start() {
        Ok(frames) => {
            let audio_sender = sender.clone();
            std::thread::Builder::new()
                .name("audio-send".to_string())
                .spawn(move || {
                    for frame in frames.iter() {
                        if let Err(e) = audio_sender.send_audio(&frame) {
                            tracing::warn!("Failed to send audio frame: {}", e);
                        }
                    }
                })?;
        }
        Err(e) => {
            tracing::warn!("Microphone unavailable ({}), sending a 440 Hz tone", e);
            tokio::spawn(send_tone(sender.clone(), config.audio.clone()));
        }
    }

    // Video: a moving test pattern once per second
    tokio::spawn(send_test_images(sender.clone()));

    // Chat: stdin lines to the listener, replies to the log
    let chat_host = config.network.remote_address.clone().unwrap_or_default();
    let chat_addr = tokio::net::lookup_host((chat_host.as_str(), config.chat.port))
        .await
        .ok()
        .and_then(|mut addrs| addrs.next());
    if let Some(chat_addr) = chat_addr {
        match ChatConnection::connect(chat_addr).await {
            Ok(conn) => {
                tokio::spawn(run_chat(conn));
            }
            Err(e) => tracing::warn!("Chat unavailable: {}", e),
        }
    }

    let mut stats_tick = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = stats_tick.tick() => {
                let stats = session.stats();
                tracing::info!(
                    "Sent {} frames in {} packets, {:.1} KB, {} dropped",
                    sender.frames_sent(),
                    stats.packets_sent,
                    stats.bytes_sent as f64 / 1024.0,
                    stats.sends_dropped
                );
            }
        }
    }

    tracing::info!("Shutting down");
    capture.stop();
    session.stop();
    Ok(())
}

async fn send_tone(sender: Arc<MediaSender>, audio: AudioConfig) {
    let samples_per_frame = audio.samples_per_frame();
    let rate = audio.input_sample_rate as f32;
    let mut phase = 0.0f32;
    let mut tick = tokio::time::interval(Duration::from_millis(audio.frame_ms as u64));

    loop {
        tick.tick().await;
        let samples: Vec<f32> = (0..samples_per_frame)
            .map(|_| {
                let value = (phase * 2.0 * std::f32::consts::PI).sin() * 0.3;
                phase = (phase + 440.0 / rate).fract();
                value
            })
            .collect();

        if let Err(e) = sender.send_audio(&encode_pcm16(&samples)) {
            tracing::warn!("Failed to send tone frame: {}", e);
        }
    }
}

async fn send_test_images(sender: Arc<MediaSender>) {
    let codec = JpegCodec::new(70);
    let (width, height) = (160u32, 120u32);
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    let mut offset = 0u32;

    loop {
        tick.tick().await;
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                rgb.extend_from_slice(&[((x + offset) % 256) as u8, (y * 2) as u8, 96]);
            }
        }
        offset = offset.wrapping_add(16);

        let encoded = RawImage::new(width, height, rgb).and_then(|image| codec.encode(&image));
        match encoded {
            Ok(bytes) => {
                if let Err(e) = sender.send_image(&bytes) {
                    tracing::warn!("Failed to send image: {}", e);
                }
            }
            Err(e) => tracing::warn!("Failed to encode test image: {}", e),
        }
    }
}

async fn run_chat(mut conn: ChatConnection) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Err(e) = conn.send(&line).await {
                        tracing::warn!("Chat send failed: {}", e);
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {}", e);
                    break;
                }
            },
            reply = conn.recv() => match reply {
                Ok(Some(text)) => println!("< {}", text),
                Ok(None) => {
                    tracing::info!("Chat closed by listener");
                    break;
                }
                Err(e) => {
                    tracing::warn!("Chat receive failed: {}", e);
                    break;
                }
            },
        }
    }
}
