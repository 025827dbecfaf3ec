//! When a motion event may fire the deterrent.

use chrono::{NaiveDateTime, TimeDelta, Timelike};
use falcoconf::PolicyConfig;
use serde::Serialize;

/// Outcome of evaluating one motion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDecision {
    Fire,
    OutOfDaylight,
    TooEarly,
}

impl PolicyDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyDecision::Fire => "fire",
            PolicyDecision::OutOfDaylight => "out_of_daylight",
            PolicyDecision::TooEarly => "too_early",
        }
    }
}

impl std::fmt::Display for PolicyDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cooldown plus daylight window. Pure; holds no state of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeterrentPolicy {
    cooldown: TimeDelta,
    /// Exclusive bounds on the local hour.
    daylight_start_hour: u32,
    daylight_end_hour: u32,
}

impl Default for DeterrentPolicy {
    fn default() -> Self {
        Self::new(TimeDelta::minutes(10), 7, 20)
    }
}

impl DeterrentPolicy {
    pub fn new(cooldown: TimeDelta, daylight_start_hour: u32, daylight_end_hour: u32) -> Self {
        Self {
            cooldown,
            daylight_start_hour,
            daylight_end_hour,
        }
    }

    pub fn from_config(config: &PolicyConfig) -> Self {
        let cooldown = i64::try_from(config.cooldown_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        Self::new(cooldown, config.daylight_start_hour, config.daylight_end_hour)
    }

    pub fn cooldown(&self) -> TimeDelta {
        self.cooldown
    }

    /// Daylight is checked first, so a night-time event reports `OutOfDaylight`
    /// even when it is also inside the cooldown.
    pub fn evaluate(&self, now: NaiveDateTime, last_fired_at: Option<NaiveDateTime>) -> PolicyDecision {
        let hour = now.hour();
        if hour <= self.daylight_start_hour || hour >= self.daylight_end_hour {
            return PolicyDecision::OutOfDaylight;
        }
        let Some(last) = last_fired_at else {
            return PolicyDecision::Fire;
        };
        match now.checked_sub_signed(self.cooldown) {
            Some(earliest) if earliest > last => PolicyDecision::Fire,
            _ => PolicyDecision::TooEarly,
        }
    }

    pub fn should_fire(&self, now: NaiveDateTime, last_fired_at: Option<NaiveDateTime>) -> bool {
        self.evaluate(now, last_fired_at) == PolicyDecision::Fire
    }
}
