//! Little-endian signed 16-bit PCM conversion

/// Iterate the samples of a PCM16 buffer as floats in [-1, 1).
///
/// A trailing odd byte is ignored.
pub fn pcm16_samples(bytes: &[u8]) -> impl Iterator<Item = f32> + '_ {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
}

/// Decode a PCM16 buffer to normalized floats
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    pcm16_samples(bytes).collect()
}

/// Encode floats as PCM16, clamping to [-1, 1]
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Average interleaved frames down to one channel
pub fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
