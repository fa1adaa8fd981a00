//! Media codecs
//!
//! Audio travels as raw PCM16; images travel as JPEG behind the
//! [`ImageCodec`] trait.

pub mod image;
pub mod pcm;

pub use self::image::{ImageCodec, JpegCodec, RawImage};
pub use pcm::{decode_pcm16, encode_pcm16};
