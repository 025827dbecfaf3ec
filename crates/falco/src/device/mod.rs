//! Audio output collaborators.
//!
//! An [`AudioDevice`] hands out [`AudioLine`]s, each one a binding to an
//! output that plays a single decoded clip. The clip player drives the line
//! through `open → rewind → start → (stopped notification) → close`.
//!
//! Implementations:
//! - [`SilentDevice`]: no output, playback length simulated on a timer thread
//! - [`RecordingDevice`]: test double that records every line event
//! - `PipeWireDevice`: real output (feature `pipewire`)

mod recording;
mod silent;

#[cfg(feature = "pipewire")]
mod pipewire;

use std::sync::Arc;

use crate::decode::DecodedAudio;
use crate::error::Result;

pub use recording::{LineEvent, RecordingDevice};
pub use silent::SilentDevice;

#[cfg(feature = "pipewire")]
pub use self::pipewire::{PipeWireDevice, PipeWireOutputConfig};

/// Notification fired once when a started playback runs to its end.
pub type PlaybackStopped = Box<dyn FnOnce() + Send + 'static>;

/// What a line must be able to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatHint {
    pub sample_rate: u32,
    pub channels: u8,
}

impl FormatHint {
    pub fn of(audio: &DecodedAudio) -> Self {
        Self {
            sample_rate: audio.sample_rate,
            channels: audio.channels,
        }
    }
}

/// Source of audio lines.
pub trait AudioDevice: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Acquire a fresh line able to play `hint`; `DeviceUnavailable` otherwise.
    fn acquire_line(&self, hint: &FormatHint) -> Result<Box<dyn AudioLine>>;
}

/// One binding to an output, primed with at most one clip.
///
/// `on_stopped` passed to [`AudioLine::start`] is invoked exactly once, from a
/// thread owned by the device, when the clip plays to its end. It is never
/// invoked from inside a call on the line, and it is dropped without being
/// called when the playback is cut short by `stop` or `close`.
pub trait AudioLine: Send {
    /// Bind `audio` to the line, positioned at frame 0.
    fn open(&mut self, audio: Arc<DecodedAudio>) -> Result<()>;

    /// Move the play position back to frame 0.
    fn rewind(&mut self);

    /// Start playing from the current position; returns immediately.
    fn start(&mut self, on_stopped: PlaybackStopped) -> Result<()>;

    /// Halt playback, keeping the binding.
    fn stop(&mut self);

    /// Release the binding. Must not wait for device threads.
    fn close(&mut self);

    /// Master gain in decibels (`-inf` is silence).
    fn set_gain_db(&mut self, db: f32);

    fn gain_db(&self) -> f32;
}

/// Upper bound of the linear volume scale (+6.02 dB).
pub const MAX_GAIN: f64 = 2.0;

/// Linear gain to decibels: `20·log10(gain)`; zero maps to `-inf`.
pub fn gain_to_db(gain: f64) -> f32 {
    (20.0 * gain.log10()) as f32
}

/// Decibels to linear gain: `10^(dB/20)`; `-inf` maps to zero.
pub fn db_to_gain(db: f32) -> f64 {
    10f64.powf(db as f64 / 20.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unity_gain_is_zero_db() {
        assert_eq!(gain_to_db(1.0), 0.0);
        assert_eq!(db_to_gain(0.0), 1.0);
    }

    #[test]
    fn silence_is_negative_infinity() {
        assert_eq!(gain_to_db(0.0), f32::NEG_INFINITY);
        assert_eq!(db_to_gain(f32::NEG_INFINITY), 0.0);
    }

    #[test]
    fn double_amplitude_is_about_six_db() {
        assert!((gain_to_db(MAX_GAIN) - 6.0206).abs() < 1e-3);
        assert!((db_to_gain(gain_to_db(0.75)) - 0.75).abs() < 1e-6);
    }
}
