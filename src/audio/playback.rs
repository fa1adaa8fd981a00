//! Audio playback
//!
//! Runs a cpal output stream on a dedicated thread. The device callback
//! pulls directly from a [`JitterBuffer`], so it never waits on the network.

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::device::find_output_device;
use crate::audio::jitter::JitterBuffer;
use crate::error::AudioError;

/// Sample rate and channel count the output device prefers
pub fn preferred_output_format(device_name: Option<&str>) -> Result<(u32, u16), AudioError> {
    let device = find_output_device(device_name)?;
    let config = device
        .default_output_config()
        .map_err(|e| AudioError::UnsupportedFormat(e.to_string()))?;
    Ok((config.sample_rate().0, config.channels()))
}

/// Plays a jitter buffer on an output device
pub struct AudioPlayback {
    device_name: Option<String>,
    channels: u16,
    jitter: Arc<JitterBuffer>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    error_rx: Option<Receiver<AudioError>>,
}

impl AudioPlayback {
    /// Playback runs at the jitter buffer's output rate
    pub fn new(device_name: Option<String>, channels: u16, jitter: Arc<JitterBuffer>) -> Self {
        Self {
            device_name,
            channels,
            jitter,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            error_rx: None,
        }
    }

    /// Start playback
    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let device = find_output_device(self.device_name.as_deref())?;
        let config = cpal::StreamConfig {
            channels: self.channels,
            sample_rate: cpal::SampleRate(self.jitter.output_rate()),
            buffer_size: cpal::BufferSize::Default,
        };

        let (error_tx, error_rx) = bounded::<AudioError>(16);
        self.error_rx = Some(error_rx);

        let running = self.running.clone();
        let jitter = self.jitter.clone();
        let channels = self.channels as usize;

        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("audio-playback".to_string())
            .spawn(move || {
                let callback_error_tx = error_tx.clone();
                let stream = device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        jitter.pull(data, channels);
                    },
                    move |err| {
                        let _ = callback_error_tx.try_send(AudioError::StreamError(err.to_string()));
                    },
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        tracing::error!("Failed to build playback stream: {}", e);
                        let _ = error_tx.try_send(AudioError::StreamError(e.to_string()));
                        running.store(false, Ordering::SeqCst);
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    tracing::error!("Failed to start playback stream: {}", e);
                    let _ = error_tx.try_send(AudioError::StreamError(e.to_string()));
                    running.store(false, Ordering::SeqCst);
                    return;
                }

                tracing::info!("Playing {} Hz x{}", config.sample_rate.0, config.channels);

                while running.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop playback
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Check for errors
    pub fn check_errors(&self) -> Option<AudioError> {
        self.error_rx.as_ref().and_then(|rx| rx.try_recv().ok())
    }
}

impl Drop for AudioPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}
