//! Infrastructure configuration - things that cannot change at runtime.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the deterrent and heartbeat sounds live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundsConfig {
    /// Directory the sound names below are resolved against.
    /// Default: /usr/share/falco/sounds
    #[serde(default = "SoundsConfig::default_dir")]
    pub dir: PathBuf,

    /// Sound played when motion is detected.
    /// Default: red-tailed-hawk-sound.wav
    #[serde(default = "SoundsConfig::default_deterrent")]
    pub deterrent: String,

    /// Sound played on every heartbeat.
    /// Default: heartbeat.wav
    #[serde(default = "SoundsConfig::default_heartbeat")]
    pub heartbeat: String,
}

impl SoundsConfig {
    fn default_dir() -> PathBuf {
        PathBuf::from("/usr/share/falco/sounds")
    }

    fn default_deterrent() -> String {
        "red-tailed-hawk-sound.wav".to_string()
    }

    fn default_heartbeat() -> String {
        "heartbeat.wav".to_string()
    }
}

impl Default for SoundsConfig {
    fn default() -> Self {
        Self {
            dir: Self::default_dir(),
            deterrent: Self::default_deterrent(),
            heartbeat: Self::default_heartbeat(),
        }
    }
}

/// Motion sensor wiring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// BCM number of the PIR output pin (WiringPi 4).
    /// Default: 23
    #[serde(default = "SensorConfig::default_gpio_pin")]
    pub gpio_pin: u8,
}

impl SensorConfig {
    fn default_gpio_pin() -> u8 {
        23
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            gpio_pin: Self::default_gpio_pin(),
        }
    }
}

/// Control endpoint bind address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// HTTP address for move/play/reinit/volume commands.
    /// Default: 127.0.0.1:8090
    #[serde(default = "ControlConfig::default_http_addr")]
    pub http_addr: String,
}

impl ControlConfig {
    fn default_http_addr() -> String {
        "127.0.0.1:8090".to_string()
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            http_addr: Self::default_http_addr(),
        }
    }
}

/// Which audio backend drives the clip players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioBackend {
    /// No output; playback duration is simulated.
    Silent,
    /// PipeWire output stream (needs the `pipewire` feature of falco).
    PipeWire,
}

impl AudioBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioBackend::Silent => "silent",
            AudioBackend::PipeWire => "pipewire",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "silent" => Some(AudioBackend::Silent),
            "pipewire" => Some(AudioBackend::PipeWire),
            _ => None,
        }
    }
}

/// Audio output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Default: silent
    #[serde(default = "AudioConfig::default_backend")]
    pub backend: AudioBackend,

    /// Output sample rate requested from the device.
    /// Default: 48000
    #[serde(default = "AudioConfig::default_sample_rate")]
    pub sample_rate: u32,

    /// Frames written per device callback.
    /// Default: 256
    #[serde(default = "AudioConfig::default_latency_frames")]
    pub latency_frames: u32,
}

impl AudioConfig {
    fn default_backend() -> AudioBackend {
        AudioBackend::Silent
    }

    fn default_sample_rate() -> u32 {
        48_000
    }

    fn default_latency_frames() -> u32 {
        256
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            backend: Self::default_backend(),
            sample_rate: Self::default_sample_rate(),
            latency_frames: Self::default_latency_frames(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level or EnvFilter directive (trace, debug, info, warn, error).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

/// Everything fixed for the lifetime of the process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfraConfig {
    #[serde(default)]
    pub sounds: SoundsConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}
