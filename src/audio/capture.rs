//! Microphone capture
//!
//! Runs a cpal input stream on a dedicated thread, downmixes to mono,
//! resamples to the wire rate by nearest-sample pick and emits fixed-length
//! PCM16 frames on a channel.

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::device::find_input_device;
use crate::codec::pcm::{downmix_to_mono, encode_pcm16};
use crate::error::AudioError;

/// Splits a mono stream into fixed-size PCM16 frames at the wire rate
pub struct FrameChunker {
    device_rate: u32,
    wire_rate: u32,
    samples_per_frame: usize,
    /// Fractional read position in device-rate samples
    position: f64,
    pending: Vec<f32>,
}

impl FrameChunker {
    pub fn new(device_rate: u32, wire_rate: u32, samples_per_frame: usize) -> Self {
        Self {
            device_rate,
            wire_rate,
            samples_per_frame: samples_per_frame.max(1),
            position: 0.0,
            pending: Vec::with_capacity(samples_per_frame * 2),
        }
    }

    /// Add mono samples at the device rate; returns every completed frame
    pub fn push(&mut self, mono: &[f32]) -> Vec<Vec<u8>> {
        let step = self.device_rate as f64 / self.wire_rate as f64;

        while (self.position as usize) < mono.len() {
            self.pending.push(mono[self.position as usize]);
            self.position += step;
        }
        self.position -= mono.len() as f64;

        let mut frames = Vec::new();
        while self.pending.len() >= self.samples_per_frame {
            let frame: Vec<f32> = self.pending.drain(..self.samples_per_frame).collect();
            frames.push(encode_pcm16(&frame));
        }
        frames
    }
}

/// Capture from one input device
pub struct AudioCapture {
    device_name: Option<String>,
    wire_rate: u32,
    samples_per_frame: usize,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    frames_captured: Arc<AtomicU64>,
}

impl AudioCapture {
    /// `samples_per_frame` is measured at `wire_rate`
    pub fn new(device_name: Option<String>, wire_rate: u32, samples_per_frame: usize) -> Self {
        Self {
            device_name,
            wire_rate,
            samples_per_frame,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            frames_captured: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start capturing; PCM16 frames arrive on the returned channel
    pub fn start(&mut self) -> Result<Receiver<Vec<u8>>, AudioError> {
        if self.running.load(Ordering::SeqCst) {
            self.stop();
        }

        let device = find_input_device(self.device_name.as_deref())?;
        let supported = device
            .default_input_config()
            .map_err(|e| AudioError::UnsupportedFormat(e.to_string()))?;
        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(AudioError::UnsupportedFormat(format!(
                "capture needs f32 samples, device offers {:?}",
                supported.sample_format()
            )));
        }
        let config = supported.config();

        let (frame_tx, frame_rx) = bounded::<Vec<u8>>(64);
        let running = self.running.clone();
        let frames_captured = self.frames_captured.clone();
        let chunker = FrameChunker::new(config.sample_rate.0, self.wire_rate, self.samples_per_frame);

        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || run_capture(device, config, chunker, frame_tx, running, frames_captured))
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        self.thread_handle = Some(handle);
        Ok(frame_rx)
    }

    /// Stop capturing audio
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::Relaxed)
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_capture(
    device: cpal::Device,
    config: cpal::StreamConfig,
    mut chunker: FrameChunker,
    frame_tx: Sender<Vec<u8>>,
    running: Arc<AtomicBool>,
    frames_captured: Arc<AtomicU64>,
) {
    let channels = config.channels as usize;
    let callback_running = running.clone();

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            if !callback_running.load(Ordering::Relaxed) {
                return;
            }
            let mono = downmix_to_mono(data, channels);
            for frame in chunker.push(&mono) {
                // Drop on a full channel rather than stall the device
                if frame_tx.try_send(frame).is_ok() {
                    frames_captured.fetch_add(1, Ordering::Relaxed);
                }
            }
        },
        |err| tracing::error!("Capture stream error: {}", err),
        None,
    );

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!("Failed to build capture stream: {}", e);
            running.store(false, Ordering::SeqCst);
            return;
        }
    };

    if let Err(e) = stream.play() {
        tracing::error!("Failed to start capture stream: {}", e);
        running.store(false, Ordering::SeqCst);
        return;
    }

    tracing::info!(
        "Capturing {} Hz x{} from input device",
        config.sample_rate.0,
        config.channels
    );

    // Keep thread alive while running; the stream stops when dropped
    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(10));
    }
}
