//! Image frame codec

use ::image::codecs::jpeg::JpegEncoder;
use ::image::{ExtendedColorType, ImageFormat};

use crate::error::CodecError;

/// Tightly packed 8-bit RGB pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl RawImage {
    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> Result<Self, CodecError> {
        if rgb.len() != width as usize * height as usize * 3 || width == 0 || height == 0 {
            return Err(CodecError::InvalidDimensions {
                width,
                height,
                len: rgb.len(),
            });
        }
        Ok(Self { width, height, rgb })
    }
}

/// Opaque image encoder/decoder: bytes in, bytes out, or failure
pub trait ImageCodec: Send + Sync {
    fn encode(&self, image: &RawImage) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, bytes: &[u8]) -> Result<RawImage, CodecError>;
}

/// Baseline JPEG
#[derive(Debug, Clone, Copy)]
pub struct JpegCodec {
    quality: u8,
}

impl JpegCodec {
    /// `quality` is clamped to 1..=100
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl Default for JpegCodec {
    fn default() -> Self {
        Self::new(75)
    }
}

impl ImageCodec for JpegCodec {
    fn encode(&self, image: &RawImage) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, self.quality)
            .encode(&image.rgb, image.width, image.height, ExtendedColorType::Rgb8)
            .map_err(|e| CodecError::EncodingFailed(e.to_string()))?;
        Ok(out)
    }

    fn decode(&self, bytes: &[u8]) -> Result<RawImage, CodecError> {
        let decoded = ::image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
            .map_err(|e| CodecError::DecodingFailed(e.to_string()))?
            .to_rgb8();

        Ok(RawImage {
            width: decoded.width(),
            height: decoded.height(),
            rgb: decoded.into_raw(),
        })
    }
}
