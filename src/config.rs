//! Application configuration
//!
//! Loaded from a TOML file; every section falls back to defaults so a
//! partial file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::ConfigError;
use crate::protocol::HEADER_SIZE;

/// Socket role of a datagram session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    /// Listener: bind `local_port`, accept datagrams from anyone
    Bound,
    /// Peer: ephemeral port, pre-associated with the configured remote
    Unbound,
}

/// Datagram transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Local address to bind
    pub bind_address: String,
    /// Local port (0 = ephemeral)
    pub local_port: u16,
    /// Remote host name or IP address
    pub remote_address: Option<String>,
    /// Remote port
    pub remote_port: u16,
    pub bind_mode: BindMode,
    /// Maximum datagram size, header included
    pub mtu: usize,
    /// Socket receive buffer size in bytes
    pub recv_buffer_size: usize,
    /// Socket send buffer size in bytes
    pub send_buffer_size: usize,
    /// Delay before re-arming the receive after a transient error
    pub retry_delay_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            local_port: DEFAULT_UDP_PORT,
            remote_address: None,
            remote_port: DEFAULT_UDP_PORT,
            bind_mode: BindMode::Bound,
            mtu: DEFAULT_MTU,
            recv_buffer_size: 1024 * 1024,
            send_buffer_size: 1024 * 1024,
            retry_delay_ms: 50,
        }
    }
}

impl NetworkConfig {
    /// Listener bound to `port` on all interfaces
    pub fn listener(port: u16) -> Self {
        Self {
            local_port: port,
            bind_mode: BindMode::Bound,
            ..Default::default()
        }
    }

    /// Peer sending to `address:port` from an ephemeral port
    pub fn peer(address: impl Into<String>, port: u16) -> Self {
        Self {
            local_port: 0,
            remote_address: Some(address.into()),
            remote_port: port,
            bind_mode: BindMode::Unbound,
            ..Default::default()
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mtu <= HEADER_SIZE {
            return Err(ConfigError::Invalid(format!(
                "mtu {} must exceed the {}-byte header",
                self.mtu, HEADER_SIZE
            )));
        }
        Ok(())
    }
}

/// Audio settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate of PCM16 audio on the wire
    pub input_sample_rate: u32,
    /// Playback sample rate
    pub output_sample_rate: u32,
    /// Playback channel count
    pub output_channels: u16,
    /// Jitter buffer length in seconds
    pub buffer_seconds: u32,
    /// Captured audio frame length in milliseconds
    pub frame_ms: u32,
    /// Playback device name (default device when unset)
    pub output_device: Option<String>,
    /// Capture device name (default device when unset)
    pub input_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: DEFAULT_INPUT_SAMPLE_RATE,
            output_sample_rate: DEFAULT_OUTPUT_SAMPLE_RATE,
            output_channels: DEFAULT_OUTPUT_CHANNELS,
            buffer_seconds: DEFAULT_BUFFER_SECONDS,
            frame_ms: DEFAULT_FRAME_SIZE_MS,
            output_device: None,
            input_device: None,
        }
    }
}

impl AudioConfig {
    /// Samples per captured frame at the wire rate
    pub fn samples_per_frame(&self) -> usize {
        (self.input_sample_rate as usize * self.frame_ms as usize) / 1000
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_seconds == 0 {
            return Err(ConfigError::Invalid("buffer_seconds must be at least 1".into()));
        }
        if self.input_sample_rate == 0 || self.output_sample_rate == 0 {
            return Err(ConfigError::Invalid("sample rates must be non-zero".into()));
        }
        if self.output_channels == 0 {
            return Err(ConfigError::Invalid("output_channels must be non-zero".into()));
        }
        Ok(())
    }
}

/// Frame reassembly settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReassemblyConfig {
    /// Age after which an incomplete frame is dropped
    pub expiry_ms: u64,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            expiry_ms: FRAME_EXPIRY_MS,
        }
    }
}

impl ReassemblyConfig {
    pub fn expiry(&self) -> Duration {
        Duration::from_millis(self.expiry_ms)
    }
}

/// Chat channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub port: u16,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_CHAT_PORT,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub audio: AudioConfig,
    pub reassembly: ReassemblyConfig,
    pub chat: ChatConfig,
}

impl AppConfig {
    /// Per-user config file location
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "lan-media-link")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Parse and validate a TOML document
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Load `path`, or the per-user file, falling back to defaults when absent
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };

        if path.exists() {
            tracing::info!("Loading configuration from {}", path.display());
            Self::load(&path)
        } else {
            tracing::debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.network.validate()?;
        self.audio.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config() {
        let config = AppConfig::from_toml(
            r#"
            [network]
            bind_mode = "unbound"
            remote_address = "192.168.1.20"
            remote_port = 6000

            [audio]
            output_sample_rate = 44100
            "#,
        )
        .unwrap();

        assert_eq!(config.network.bind_mode, BindMode::Unbound);
        assert_eq!(config.network.remote_address.as_deref(), Some("192.168.1.20"));
        assert_eq!(config.network.mtu, DEFAULT_MTU);
        assert_eq!(config.audio.output_sample_rate, 44100);
        assert_eq!(config.audio.input_sample_rate, DEFAULT_INPUT_SAMPLE_RATE);
        assert_eq!(config.reassembly.expiry(), Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_mtu_rejected() {
        let err = AppConfig::from_toml("[network]\nmtu = 12\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_zero_buffer_seconds_rejected() {
        let err = AppConfig::from_toml("[audio]\nbuffer_seconds = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.network = NetworkConfig::peer("example.org", 7000);
        config.chat.port = 7001;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.network.bind_mode, BindMode::Unbound);
        assert_eq!(loaded.network.remote_address.as_deref(), Some("example.org"));
        assert_eq!(loaded.network.remote_port, 7000);
        assert_eq!(loaded.chat.port, 7001);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.network.local_port, DEFAULT_UDP_PORT);
    }

    #[test]
    fn test_samples_per_frame() {
        let audio = AudioConfig::default();
        assert_eq!(audio.samples_per_frame(), 320);
    }
}
