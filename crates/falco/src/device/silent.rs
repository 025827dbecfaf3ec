//! Output-less device used for dry runs and boards without a sound card.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use super::{AudioDevice, AudioLine, FormatHint, PlaybackStopped};
use crate::decode::DecodedAudio;
use crate::error::{FalcoError, Result};

/// Device whose lines "play" by waiting out the clip duration.
#[derive(Debug, Clone, Default)]
pub struct SilentDevice {
    /// Overrides the clip duration, mostly for tests.
    fixed_duration: Option<Duration>,
}

impl SilentDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every playback lasts `duration` regardless of the clip.
    pub fn with_fixed_duration(duration: Duration) -> Self {
        Self {
            fixed_duration: Some(duration),
        }
    }
}

impl AudioDevice for SilentDevice {
    fn name(&self) -> &str {
        "silent"
    }

    fn acquire_line(&self, hint: &FormatHint) -> Result<Box<dyn AudioLine>> {
        if hint.channels == 0 || hint.sample_rate == 0 {
            return Err(FalcoError::DeviceUnavailable(format!(
                "no line for {} channels @ {}Hz",
                hint.channels, hint.sample_rate
            )));
        }
        Ok(Box::new(SilentLine {
            fixed_duration: self.fixed_duration,
            audio: None,
            cancel: None,
            gain_db: 0.0,
        }))
    }
}

struct SilentLine {
    fixed_duration: Option<Duration>,
    audio: Option<Arc<DecodedAudio>>,
    /// Dropping the sender cancels the in-flight playback timer.
    cancel: Option<Sender<()>>,
    gain_db: f32,
}

impl AudioLine for SilentLine {
    fn open(&mut self, audio: Arc<DecodedAudio>) -> Result<()> {
        self.audio = Some(audio);
        Ok(())
    }

    fn rewind(&mut self) {}

    fn start(&mut self, on_stopped: PlaybackStopped) -> Result<()> {
        let Some(audio) = &self.audio else {
            return Err(FalcoError::NotReady("start()"));
        };
        let duration = self
            .fixed_duration
            .unwrap_or_else(|| Duration::from_secs_f64(audio.duration_seconds()));

        let (tx, rx) = mpsc::channel::<()>();
        self.cancel = Some(tx);

        thread::Builder::new()
            .name("falco-silent-line".to_string())
            .spawn(move || match rx.recv_timeout(duration) {
                Err(RecvTimeoutError::Timeout) => on_stopped(),
                _ => debug!("silent playback cancelled"),
            })
            .map_err(|e| FalcoError::DeviceUnavailable(format!("failed to spawn line thread: {}", e)))?;

        Ok(())
    }

    fn stop(&mut self) {
        self.cancel = None;
    }

    fn close(&mut self) {
        self.stop();
        if self.audio.take().is_none() {
            warn!("closing a silent line that was never opened");
        }
    }

    fn set_gain_db(&mut self, db: f32) {
        self.gain_db = db;
    }

    fn gain_db(&self) -> f32 {
        self.gain_db
    }
}
