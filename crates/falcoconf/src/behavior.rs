//! Behavior configuration - the deterrent policy and heartbeat cadence.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// When a detected motion is allowed to fire the deterrent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Minimum seconds between two deterrent playbacks.
    /// Default: 600
    #[serde(default = "PolicyConfig::default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Firing is allowed strictly after this local hour.
    /// Default: 7
    #[serde(default = "PolicyConfig::default_daylight_start_hour")]
    pub daylight_start_hour: u32,

    /// Firing is allowed strictly before this local hour.
    /// Default: 20
    #[serde(default = "PolicyConfig::default_daylight_end_hour")]
    pub daylight_end_hour: u32,
}

impl PolicyConfig {
    fn default_cooldown_secs() -> u64 {
        600
    }

    fn default_daylight_start_hour() -> u32 {
        7
    }

    fn default_daylight_end_hour() -> u32 {
        20
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: Self::default_cooldown_secs(),
            daylight_start_hour: Self::default_daylight_start_hour(),
            daylight_end_hour: Self::default_daylight_end_hour(),
        }
    }
}

/// Periodic liveness sound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Default: true
    #[serde(default = "HeartbeatConfig::default_enabled")]
    pub enabled: bool,

    /// Milliseconds between two beats.
    /// Default: 300000 (5 minutes)
    #[serde(default = "HeartbeatConfig::default_period_ms")]
    pub period_ms: u64,
}

impl HeartbeatConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_period_ms() -> u64 {
        5 * 60 * 1000
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            period_ms: Self::default_period_ms(),
        }
    }
}

/// Runtime behavior knobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorConfig {
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
}
