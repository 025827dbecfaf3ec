//! One audio line bound to one sound resource.
//!
//! Hardware lines degrade when the same binding is replayed, so every
//! completed playback closes the binding and opens a fresh one primed with
//! the already-decoded clip. Callers only ever see `Ready → Playing → Ready`.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, error, info, warn};

use crate::decode::{decode_audio, DecodedAudio};
use crate::device::{db_to_gain, gain_to_db, AudioDevice, AudioLine, FormatHint, MAX_GAIN};
use crate::error::{FalcoError, Result};
use crate::resource::{validate_name, ResourceLoader};

/// Lifecycle of a [`ClipPlayer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Closed,
    /// Open and primed at frame 0.
    Ready,
    Playing,
}

/// Exclusive owner of one audio line. Clones share the same line.
#[derive(Clone)]
pub struct ClipPlayer {
    inner: Arc<Mutex<PlayerInner>>,
}

struct PlayerInner {
    label: String,
    device: Arc<dyn AudioDevice>,
    loader: Arc<dyn ResourceLoader>,
    resource: Option<String>,
    audio: Option<Arc<DecodedAudio>>,
    line: Option<Box<dyn AudioLine>>,
    state: PlayerState,
    /// Survives rebinding; applied to every new line.
    gain_db: f32,
    /// Bumped whenever a binding goes away, so late stop notifications from
    /// an older binding are recognisable.
    generation: u64,
    playbacks: u64,
}

impl PlayerInner {
    fn bind(&mut self, audio: Arc<DecodedAudio>) -> Result<()> {
        let mut line = self.device.acquire_line(&FormatHint::of(&audio))?;
        line.open(audio)?;
        line.set_gain_db(self.gain_db);
        self.line = Some(line);
        self.state = PlayerState::Ready;
        Ok(())
    }

    fn release(&mut self) {
        if let Some(mut line) = self.line.take() {
            line.stop();
            line.close();
        }
        self.state = PlayerState::Closed;
        self.generation += 1;
    }
}

impl ClipPlayer {
    /// `label` names the player in logs ("deterrent", "heartbeat").
    pub fn new(
        label: impl Into<String>,
        device: Arc<dyn AudioDevice>,
        loader: Arc<dyn ResourceLoader>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PlayerInner {
                label: label.into(),
                device,
                loader,
                resource: None,
                audio: None,
                line: None,
                state: PlayerState::Closed,
                gain_db: 0.0,
                generation: 0,
                playbacks: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PlayerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Load, decode and bind `name`; an open player is closed first.
    pub fn open(&self, name: &str) -> Result<()> {
        validate_name(name)?;

        let loader = Arc::clone(&self.lock().loader);
        let resource = loader.load(name)?;
        let audio = decode_audio(resource.bytes()).map_err(|e| FalcoError::UnsupportedFormat {
            name: name.to_string(),
            reason: format!("{:#}", e),
        })?;
        let audio = Arc::new(audio);

        let mut inner = self.lock();
        if inner.state != PlayerState::Closed {
            debug!("{}: closing previous binding before open", inner.label);
            inner.release();
        }
        inner.resource = Some(name.to_string());
        inner.audio = Some(Arc::clone(&audio));
        inner.bind(Arc::clone(&audio))?;

        info!(
            "{}: opened '{}' on {} ({} frames @ {}Hz, {}ch)",
            inner.label,
            name,
            inner.device.name(),
            audio.frames(),
            audio.sample_rate,
            audio.channels
        );
        Ok(())
    }

    /// Start playing from frame 0 and return without waiting.
    pub fn trigger(&self) -> Result<()> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.state != PlayerState::Ready {
            return Err(FalcoError::NotReady("trigger()"));
        }
        let Some(line) = inner.line.as_mut() else {
            return Err(FalcoError::NotReady("trigger()"));
        };

        let generation = inner.generation;
        let player = Arc::downgrade(&self.inner);
        line.rewind();
        line.start(Box::new(move || on_playback_stopped(player, generation)))?;

        inner.state = PlayerState::Playing;
        inner.playbacks += 1;
        debug!("{}: playback #{} started", inner.label, inner.playbacks);
        Ok(())
    }

    /// Stop any playback and release the binding. Safe to call repeatedly.
    pub fn close(&self) {
        let mut inner = self.lock();
        if inner.state == PlayerState::Closed && inner.line.is_none() {
            return;
        }
        inner.release();
        info!("{}: closed", inner.label);
    }

    /// Set the linear gain, `0.0..=2.0`.
    pub fn set_volume(&self, gain: f64) -> Result<()> {
        if gain.is_nan() || !(0.0..=MAX_GAIN).contains(&gain) {
            return Err(FalcoError::InvalidArgument(format!(
                "volume must be within [0.0, {:.1}], got {}",
                MAX_GAIN, gain
            )));
        }
        let db = gain_to_db(gain);
        let mut inner = self.lock();
        inner.gain_db = db;
        if let Some(line) = inner.line.as_mut() {
            line.set_gain_db(db);
        }
        debug!("{}: volume {} ({:.2} dB)", inner.label, gain, db);
        Ok(())
    }

    /// Linear gain rounded to two decimals.
    pub fn get_volume(&self) -> f64 {
        let gain = db_to_gain(self.lock().gain_db);
        (gain * 100.0).round() / 100.0
    }

    pub fn state(&self) -> PlayerState {
        self.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() != PlayerState::Closed
    }

    /// Number of playbacks started since construction.
    pub fn playbacks(&self) -> u64 {
        self.lock().playbacks
    }

    pub fn resource_name(&self) -> Option<String> {
        self.lock().resource.clone()
    }
}

impl std::fmt::Debug for ClipPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("ClipPlayer")
            .field("label", &inner.label)
            .field("resource", &inner.resource)
            .field("state", &inner.state)
            .field("playbacks", &inner.playbacks)
            .finish()
    }
}

/// Runs on the device's thread. Takes only the player lock.
fn on_playback_stopped(player: Weak<Mutex<PlayerInner>>, generation: u64) {
    let Some(player) = player.upgrade() else {
        return;
    };
    let mut inner = player.lock().unwrap_or_else(|e| e.into_inner());
    if inner.generation != generation || inner.state != PlayerState::Playing {
        debug!("{}: ignoring stop notification from a released line", inner.label);
        return;
    }

    inner.release();
    let Some(audio) = inner.audio.clone() else {
        warn!("{}: playback stopped with no clip to reopen", inner.label);
        return;
    };
    match inner.bind(audio) {
        Ok(()) => debug!("{}: line reopened", inner.label),
        Err(e) => error!("{}: failed to reopen line after playback: {}", inner.label, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::tests::generate_test_wav;
    use crate::device::{LineEvent, RecordingDevice};
    use crate::resource::MemoryResourceLoader;

    const CLIP: &str = "hawk.wav";

    fn player() -> (ClipPlayer, RecordingDevice) {
        let device = RecordingDevice::new();
        let loader = MemoryResourceLoader::new()
            .with(CLIP, generate_test_wav(480, 48000))
            .with("noise.bin", vec![0x42; 64]);
        let player = ClipPlayer::new("test", Arc::new(device.clone()), Arc::new(loader));
        (player, device)
    }

    #[test]
    fn open_binds_a_ready_line() {
        let (player, device) = player();
        player.open(CLIP).unwrap();

        assert_eq!(player.state(), PlayerState::Ready);
        assert_eq!(player.resource_name().as_deref(), Some(CLIP));
        assert_eq!(
            device.events(),
            vec![LineEvent::Acquired(0), LineEvent::Opened(0), LineEvent::Gain(0, 0.0)]
        );
    }

    #[test]
    fn open_rejects_blank_names() {
        let (player, _) = player();
        for name in ["", "   "] {
            assert!(matches!(player.open(name), Err(FalcoError::InvalidArgument(_))));
        }
        assert_eq!(player.state(), PlayerState::Closed);
    }

    #[test]
    fn open_reports_missing_and_undecodable_resources() {
        let (player, _) = player();
        assert_eq!(
            player.open("missing.wav"),
            Err(FalcoError::ResourceNotFound("missing.wav".to_string()))
        );
        assert!(matches!(
            player.open("noise.bin"),
            Err(FalcoError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn open_reports_unavailable_device() {
        let (player, device) = player();
        device.fail_next_acquire(FalcoError::DeviceUnavailable("busy".to_string()));

        assert!(matches!(player.open(CLIP), Err(FalcoError::DeviceUnavailable(_))));
        assert!(!player.is_open());
    }

    #[test]
    fn reopening_releases_previous_binding() {
        let (player, device) = player();
        player.open(CLIP).unwrap();
        player.open(CLIP).unwrap();

        assert_eq!(device.lines_acquired(), 2);
        assert_eq!(device.closes(), 1);
        assert!(player.is_open());
    }

    #[test]
    fn trigger_requires_ready() {
        let (player, device) = player();
        assert_eq!(player.trigger(), Err(FalcoError::NotReady("trigger()")));

        player.open(CLIP).unwrap();
        player.trigger().unwrap();
        assert_eq!(player.state(), PlayerState::Playing);
        assert_eq!(player.trigger(), Err(FalcoError::NotReady("trigger()")));
        assert_eq!(device.starts(), 1);
    }

    #[test]
    fn completed_playback_reopens_line() {
        let (player, device) = player();
        player.open(CLIP).unwrap();
        player.set_volume(0.5).unwrap();
        player.trigger().unwrap();

        assert!(device.complete_playback());

        assert_eq!(player.state(), PlayerState::Ready);
        assert_eq!(device.lines_acquired(), 2);
        assert_eq!(device.closes(), 1);
        assert_eq!(device.last_gain_db(), Some(gain_to_db(0.5)));

        player.trigger().unwrap();
        assert_eq!(player.playbacks(), 2);
    }

    #[test]
    fn failed_reopen_leaves_player_closed() {
        let (player, device) = player();
        player.open(CLIP).unwrap();
        player.trigger().unwrap();
        device.fail_next_acquire(FalcoError::DeviceUnavailable("unplugged".to_string()));

        assert!(device.complete_playback());

        assert_eq!(player.state(), PlayerState::Closed);
        assert_eq!(player.trigger(), Err(FalcoError::NotReady("trigger()")));
    }

    #[test]
    fn close_is_idempotent_and_cancels_playback() {
        let (player, device) = player();
        player.open(CLIP).unwrap();
        player.trigger().unwrap();

        player.close();
        player.close();

        assert_eq!(player.state(), PlayerState::Closed);
        assert_eq!(device.closes(), 1);
        assert_eq!(device.playing(), 0);
        assert!(!device.complete_playback());
    }

    #[test]
    fn volume_round_trips() {
        let (player, _) = player();
        player.open(CLIP).unwrap();
        for gain in [0.0, 0.75, 2.0] {
            player.set_volume(gain).unwrap();
            assert_eq!(player.get_volume(), gain);
        }
    }

    #[test]
    fn volume_bounds_are_inclusive() {
        let (player, _) = player();
        assert!(player.set_volume(0.0).is_ok());
        assert!(player.set_volume(2.0).is_ok());
        for gain in [-0.01, 2.01, f64::NAN] {
            assert!(matches!(
                player.set_volume(gain),
                Err(FalcoError::InvalidArgument(_))
            ));
        }
        assert_eq!(player.get_volume(), 2.0);
    }

    #[test]
    fn volume_survives_fresh_open() {
        let (player, device) = player();
        player.set_volume(0.75).unwrap();
        player.open(CLIP).unwrap();

        assert_eq!(device.last_gain_db(), Some(gain_to_db(0.75)));
        assert_eq!(player.get_volume(), 0.75);
    }
}
