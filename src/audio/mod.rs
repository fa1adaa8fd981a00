//! Audio subsystem module

pub mod buffer;
pub mod capture;
pub mod device;
pub mod jitter;
pub mod playback;

pub use buffer::AudioRing;
pub use capture::AudioCapture;
pub use device::{list_devices, DeviceInfo};
pub use jitter::{JitterBuffer, JitterStats};
pub use playback::{preferred_output_format, AudioPlayback};
