//! Jitter buffer with sample-rate conversion
//!
//! Bridges bursty network arrival of PCM16 frames at the input rate and a
//! playback callback that pulls a fixed number of frames at the output rate.
//! `pull` never waits on anything but a short lock whose hold time is bounded
//! by the block size, and never allocates.

use parking_lot::Mutex;

use crate::audio::buffer::AudioRing;
use crate::codec::pcm::pcm16_samples;

struct JitterState {
    ring: AudioRing,
    /// Fractional read position into `ring`
    cursor: f64,
    frames_received: u64,
    overflowed_samples: u64,
    underrun_frames: u64,
}

/// Snapshot of jitter buffer statistics
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JitterStats {
    pub buffered: usize,
    pub capacity: usize,
    pub frames_received: u64,
    pub overflowed_samples: u64,
    pub underrun_frames: u64,
}

impl JitterStats {
    pub fn fill_level(&self) -> f32 {
        if self.capacity == 0 {
            0.0
        } else {
            self.buffered as f32 / self.capacity as f32
        }
    }
}

/// Mono audio jitter buffer feeding a fixed-cadence consumer
pub struct JitterBuffer {
    state: Mutex<JitterState>,
    input_rate: u32,
    output_rate: u32,
    /// Input samples consumed per output frame
    step: f64,
    capacity: usize,
}

impl JitterBuffer {
    /// Buffer `buffer_seconds` of audio at the higher of the two rates
    pub fn new(input_rate: u32, output_rate: u32, buffer_seconds: u32) -> Self {
        let capacity = input_rate.max(output_rate) as usize * buffer_seconds.max(1) as usize;
        Self::with_capacity(input_rate, output_rate, capacity)
    }

    pub fn with_capacity(input_rate: u32, output_rate: u32, capacity: usize) -> Self {
        assert!(input_rate > 0 && output_rate > 0, "Sample rates must be non-zero");

        tracing::debug!(
            "Jitter buffer: {} Hz -> {} Hz, {} samples",
            input_rate,
            output_rate,
            capacity
        );

        Self {
            state: Mutex::new(JitterState {
                ring: AudioRing::new(capacity),
                cursor: 0.0,
                frames_received: 0,
                overflowed_samples: 0,
                underrun_frames: 0,
            }),
            input_rate,
            output_rate,
            step: input_rate as f64 / output_rate as f64,
            capacity,
        }
    }

    /// Append a reassembled PCM16 little-endian frame.
    ///
    /// When the ring is full the oldest samples are evicted and the read
    /// cursor moves back with them. At most `capacity` samples are decoded
    /// under the lock; anything older in an oversized frame is counted as
    /// overflow without being stored.
    pub fn on_frame_arrived(&self, pcm16: &[u8]) {
        let skipped = (pcm16.len() / 2).saturating_sub(self.capacity);
        let kept = &pcm16[skipped * 2..];

        let mut state = self.state.lock();
        let state = &mut *state;
        state.frames_received += 1;

        let mut evicted = 0u64;
        for sample in pcm16_samples(kept) {
            if state.ring.push(sample) {
                evicted += 1;
                state.cursor = (state.cursor - 1.0).max(0.0);
            }
        }
        if skipped > 0 {
            evicted += skipped as u64;
            state.cursor = (state.cursor - skipped as f64).max(0.0);
        }

        if evicted > 0 {
            state.overflowed_samples += evicted;
            tracing::trace!("Jitter buffer overflow, dropped {} oldest samples", evicted);
        }
    }

    /// Fill `out` with interleaved frames of `channels` channels at the
    /// output rate. The same mono value is written to every channel; frames
    /// with no buffered audio are silent.
    ///
    /// Returns the number of frames written.
    pub fn pull(&self, out: &mut [f32], channels: usize) -> usize {
        let channels = channels.max(1);
        let frames = out.len() / channels;

        let mut state = self.state.lock();
        let state = &mut *state;

        for frame in out.chunks_exact_mut(channels) {
            let index = state.cursor as usize;
            let value = match state.ring.get(index) {
                Some(current) => {
                    let next = state.ring.get(index + 1).unwrap_or(current);
                    let frac = (state.cursor - index as f64) as f32;
                    state.cursor += self.step;
                    current + (next - current) * frac
                }
                None => {
                    state.underrun_frames += 1;
                    0.0
                }
            };
            frame.fill(value);
        }
        out[frames * channels..].fill(0.0);

        // Keep the sub-sample remainder so the next block continues in phase
        let whole = state.cursor as usize;
        let consumed = state.ring.discard(whole);
        state.cursor -= consumed as f64;
        if state.ring.is_empty() {
            state.cursor = state.cursor.fract();
        }

        frames
    }

    /// Drop all buffered audio
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.ring.clear();
        state.cursor = 0.0;
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn buffered(&self) -> usize {
        self.state.lock().ring.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get statistics
    pub fn stats(&self) -> JitterStats {
        let state = self.state.lock();
        JitterStats {
            buffered: state.ring.len(),
            capacity: state.ring.capacity(),
            frames_received: state.frames_received,
            overflowed_samples: state.overflowed_samples,
            underrun_frames: state.underrun_frames,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::pcm::{decode_pcm16, encode_pcm16};

    fn tone(rate: u32, freq: f32, seconds: f32) -> Vec<u8> {
        let count = (rate as f32 * seconds) as usize;
        let samples: Vec<f32> = (0..count)
            .map(|i| (i as f32 / rate as f32 * freq * 2.0 * std::f32::consts::PI).sin() * 0.8)
            .collect();
        encode_pcm16(&samples)
    }

    fn max_step_delta(samples: &[f32]) -> f32 {
        samples.windows(2).map(|w| (w[1] - w[0]).abs()).fold(0.0, f32::max)
    }

    fn feed(jitter: &JitterBuffer, pcm: &[u8], frame_bytes: usize) {
        for frame in pcm.chunks(frame_bytes) {
            jitter.on_frame_arrived(frame);
        }
    }

    #[test]
    fn test_empty_pull_is_silent() {
        let jitter = JitterBuffer::new(16000, 48000, 2);
        let mut out = vec![1.0f32; 512];

        assert_eq!(jitter.pull(&mut out, 2), 256);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(jitter.stats().underrun_frames, 256);
    }

    #[test]
    fn test_capacity_from_rates() {
        let jitter = JitterBuffer::new(16000, 48000, 2);
        assert_eq!(jitter.capacity(), 96000);
    }

    #[test]
    fn test_same_rate_passthrough() {
        let jitter = JitterBuffer::new(48000, 48000, 1);
        jitter.on_frame_arrived(&encode_pcm16(&[0.25, 0.5, -0.25]));

        let mut out = vec![9.0f32; 8];
        assert_eq!(jitter.pull(&mut out, 2), 4);

        let expected = decode_pcm16(&encode_pcm16(&[0.25, 0.5, -0.25]));
        assert_eq!(&out[..6], &[expected[0], expected[0], expected[1], expected[1], expected[2], expected[2]]);
        assert_eq!(&out[6..], &[0.0, 0.0]);
        assert_eq!(jitter.buffered(), 0);
    }

    #[test]
    fn test_overflow_keeps_newest_samples() {
        let jitter = JitterBuffer::with_capacity(8000, 8000, 8);
        let samples: Vec<f32> = (0..12).map(|i| i as f32 / 16.0).collect();
        jitter.on_frame_arrived(&encode_pcm16(&samples));

        let stats = jitter.stats();
        assert_eq!(stats.buffered, 8);
        assert_eq!(stats.overflowed_samples, 4);

        let mut out = vec![0.0f32; 8];
        jitter.pull(&mut out, 1);
        let expected = decode_pcm16(&encode_pcm16(&samples[4..]));
        assert_eq!(out, expected);
    }

    #[test]
    fn test_oversized_frame_keeps_last_capacity_samples() {
        let jitter = JitterBuffer::with_capacity(24000, 48000, 4);
        jitter.on_frame_arrived(&encode_pcm16(&[0.125, 0.25, 0.375, 0.5]));

        let mut out = [0.0f32; 1];
        jitter.pull(&mut out, 1);

        let newer = [0.0625, 0.1875, 0.3125, 0.4375, 0.5625, 0.6875];
        jitter.on_frame_arrived(&encode_pcm16(&newer));

        let stats = jitter.stats();
        assert_eq!(stats.buffered, 4);
        assert_eq!(stats.overflowed_samples, 6);

        // Cursor was pulled back to the oldest kept sample
        jitter.pull(&mut out, 1);
        assert_eq!(out[0], 0.3125);
    }

    #[test]
    fn test_eviction_moves_cursor_back() {
        // Two output frames per input sample
        let jitter = JitterBuffer::with_capacity(24000, 48000, 4);
        jitter.on_frame_arrived(&encode_pcm16(&[0.125, 0.25, 0.375, 0.5]));

        let mut out = [0.0f32; 1];
        jitter.pull(&mut out, 1);
        assert_eq!(out[0], 0.125);

        jitter.on_frame_arrived(&encode_pcm16(&[0.625, 0.75]));
        jitter.pull(&mut out, 1);
        assert_eq!(out[0], 0.375);
    }

    #[test]
    fn test_linear_interpolation() {
        let jitter = JitterBuffer::with_capacity(24000, 48000, 16);
        jitter.on_frame_arrived(&encode_pcm16(&[0.0, 0.5, 0.25]));

        let mut out = [0.0f32; 4];
        jitter.pull(&mut out, 1);
        let halfway = decode_pcm16(&encode_pcm16(&[0.5]))[0];
        assert_eq!(out[0], 0.0);
        assert!((out[1] - halfway / 2.0).abs() < 1e-6);
        assert_eq!(out[2], halfway);
        // One sample consumed per two output frames
        assert_eq!(jitter.buffered(), 1);
    }

    #[test]
    fn test_upsampling_is_continuous_across_blocks() {
        let pcm = tone(16000, 440.0, 1.0);
        let source = decode_pcm16(&pcm);
        let bound = max_step_delta(&source) + 1e-6;

        let jitter = JitterBuffer::new(16000, 48000, 2);
        feed(&jitter, &pcm, 640);

        let mut output = Vec::new();
        let mut block = vec![0.0f32; 480 * 2];
        for _ in 0..20 {
            jitter.pull(&mut block, 2);
            output.extend(block.chunks_exact(2).map(|f| f[0]));
        }

        for pair in output.windows(2) {
            assert!((pair[1] - pair[0]).abs() <= bound, "jump of {}", (pair[1] - pair[0]).abs());
        }
    }

    #[test]
    fn test_downsampling_is_continuous_across_blocks() {
        let pcm = tone(48000, 440.0, 0.5);
        let source = decode_pcm16(&pcm);
        let step = 48000.0f32 / 44100.0;
        let bound = max_step_delta(&source) * step.ceil() + 1e-6;

        let jitter = JitterBuffer::new(48000, 44100, 1);
        feed(&jitter, &pcm, 1920);

        let mut output = Vec::new();
        let mut block = vec![0.0f32; 441];
        for _ in 0..40 {
            jitter.pull(&mut block, 1);
            output.extend_from_slice(&block);
        }

        for pair in output.windows(2) {
            assert!((pair[1] - pair[0]).abs() <= bound);
        }
    }

    #[test]
    fn test_block_size_does_not_change_output() {
        let pcm = tone(44100, 1000.0, 0.2);

        let whole = JitterBuffer::new(44100, 48000, 1);
        whole.on_frame_arrived(&pcm);
        let mut single = vec![0.0f32; 4800];
        whole.pull(&mut single, 1);

        let split = JitterBuffer::new(44100, 48000, 1);
        split.on_frame_arrived(&pcm);
        let mut blocks = Vec::new();
        let mut block = vec![0.0f32; 480];
        for _ in 0..10 {
            split.pull(&mut block, 1);
            blocks.extend_from_slice(&block);
        }

        for (a, b) in single.iter().zip(blocks.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }
}
