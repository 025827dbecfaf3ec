//! Layered configuration loading for Falco.
//!
//! Configuration is split into two categories:
//!
//! - **Infrastructure** (`InfraConfig`): sound locations, sensor wiring, the
//!   control bind address, audio backend and logging. Fixed for the process.
//!
//! - **Behavior** (`BehaviorConfig`): deterrent policy windows and heartbeat
//!   cadence.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/falco/config.toml` (system)
//! 2. `~/.config/falco/config.toml` (user)
//! 3. `./falco.toml` or the path given on the command line
//! 4. Environment variables (`FALCO_*`, `RUST_LOG`)
//!
//! Each layer only overrides the keys it sets.
//!
//! # Example Config
//!
//! ```toml
//! [sounds]
//! dir = "~/falco/sounds"
//! deterrent = "red-tailed-hawk-sound.wav"
//! heartbeat = "heartbeat.wav"
//!
//! [policy]
//! cooldown_secs = 600
//! daylight_start_hour = 7
//! daylight_end_hour = 20
//!
//! [heartbeat]
//! period_ms = 300000
//! ```

pub mod behavior;
pub mod infra;
pub mod loader;

pub use behavior::{BehaviorConfig, HeartbeatConfig, PolicyConfig};
pub use infra::{
    AudioBackend, AudioConfig, ControlConfig, InfraConfig, SensorConfig, SoundsConfig,
    TelemetryConfig,
};
pub use loader::{discover_config_files_with_override, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete Falco configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FalcoConfig {
    #[serde(flatten)]
    pub infra: InfraConfig,

    #[serde(flatten)]
    pub behavior: BehaviorConfig,
}

impl FalcoConfig {
    /// Load configuration, letting `config_path` replace `./falco.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    ///
    /// The merged result is validated before it is returned.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = FalcoConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            loader::load_from_file(&mut config, &path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        config.validate()?;
        Ok((config, sources))
    }

    /// Reject combinations the daemon cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let policy = &self.behavior.policy;
        if policy.daylight_start_hour > 23 || policy.daylight_end_hour > 23 {
            return Err(ConfigError::Invalid(format!(
                "daylight hours must be within 0..=23 (got {}..{})",
                policy.daylight_start_hour, policy.daylight_end_hour
            )));
        }
        if policy.daylight_start_hour >= policy.daylight_end_hour {
            return Err(ConfigError::Invalid(format!(
                "daylight_start_hour ({}) must be before daylight_end_hour ({})",
                policy.daylight_start_hour, policy.daylight_end_hour
            )));
        }
        if policy.cooldown_secs == 0 {
            return Err(ConfigError::Invalid("cooldown_secs must be positive".to_string()));
        }
        if self.behavior.heartbeat.period_ms == 0 {
            return Err(ConfigError::Invalid("heartbeat period_ms must be positive".to_string()));
        }
        if self.infra.sounds.deterrent.trim().is_empty() {
            return Err(ConfigError::Invalid("deterrent sound can not be blank".to_string()));
        }
        if self.behavior.heartbeat.enabled && self.infra.sounds.heartbeat.trim().is_empty() {
            return Err(ConfigError::Invalid("heartbeat sound can not be blank".to_string()));
        }
        Ok(())
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        // Build TOML manually for stable section order
        let mut output = String::new();
        let infra = &self.infra;
        let behavior = &self.behavior;

        output.push_str("# Falco Configuration\n\n");

        output.push_str("[sounds]\n");
        output.push_str(&format!("dir = \"{}\"\n", infra.sounds.dir.display()));
        output.push_str(&format!("deterrent = \"{}\"\n", infra.sounds.deterrent));
        output.push_str(&format!("heartbeat = \"{}\"\n", infra.sounds.heartbeat));

        output.push_str("\n[policy]\n");
        output.push_str(&format!("cooldown_secs = {}\n", behavior.policy.cooldown_secs));
        output.push_str(&format!(
            "daylight_start_hour = {}\n",
            behavior.policy.daylight_start_hour
        ));
        output.push_str(&format!(
            "daylight_end_hour = {}\n",
            behavior.policy.daylight_end_hour
        ));

        output.push_str("\n[heartbeat]\n");
        output.push_str(&format!("enabled = {}\n", behavior.heartbeat.enabled));
        output.push_str(&format!("period_ms = {}\n", behavior.heartbeat.period_ms));

        output.push_str("\n[sensor]\n");
        output.push_str(&format!("gpio_pin = {}\n", infra.sensor.gpio_pin));

        output.push_str("\n[control]\n");
        output.push_str(&format!("http_addr = \"{}\"\n", infra.control.http_addr));

        output.push_str("\n[audio]\n");
        output.push_str(&format!("backend = \"{}\"\n", infra.audio.backend.as_str()));
        output.push_str(&format!("sample_rate = {}\n", infra.audio.sample_rate));
        output.push_str(&format!("latency_frames = {}\n", infra.audio.latency_frames));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!("log_level = \"{}\"\n", infra.telemetry.log_level));

        output
    }
}
