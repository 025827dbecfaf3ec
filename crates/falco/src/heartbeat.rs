//! Periodic liveness sound on its own player.
//!
//! Runs at a fixed rate against deadlines, so a slow tick does not push later
//! ticks back. Never touches the motion controller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::error::{FalcoError, Result};
use crate::player::{ClipPlayer, PlayerState};

struct Ticker {
    /// Dropped to stop the thread.
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct Heartbeat {
    player: ClipPlayer,
    sound: String,
    period: Duration,
    beats: Arc<AtomicU64>,
    ticker: Mutex<Option<Ticker>>,
}

impl Heartbeat {
    pub fn new(player: ClipPlayer, sound: impl Into<String>, period: Duration) -> Self {
        Self {
            player,
            sound: sound.into(),
            period,
            beats: Arc::new(AtomicU64::new(0)),
            ticker: Mutex::new(None),
        }
    }

    fn lock_ticker(&self) -> MutexGuard<'_, Option<Ticker>> {
        self.ticker.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open the player and start ticking, first tick immediately.
    pub fn start(&self) -> Result<()> {
        let mut ticker = self.lock_ticker();
        if ticker.is_some() {
            return Ok(());
        }
        if self.period.is_zero() {
            return Err(FalcoError::InvalidArgument(
                "heartbeat period must be positive".to_string(),
            ));
        }

        self.player.open(&self.sound)?;

        let (stop, stop_rx) = mpsc::channel::<()>();
        let player = self.player.clone();
        let beats = Arc::clone(&self.beats);
        let period = self.period;

        let handle = thread::Builder::new()
            .name("falco-heartbeat".to_string())
            .spawn(move || {
                let mut deadline = Instant::now();
                loop {
                    beat(&player, &beats);
                    let Some(next) = deadline.checked_add(period) else {
                        // Next beat lies beyond what `Instant` can represent.
                        let _ = stop_rx.recv();
                        break;
                    };
                    deadline = next;
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                }
                debug!("heartbeat thread exiting");
            });
        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                self.player.close();
                return Err(FalcoError::DeviceUnavailable(format!(
                    "failed to spawn heartbeat thread: {}",
                    e
                )));
            }
        };

        *ticker = Some(Ticker { stop, handle });
        info!("heartbeat every {:?}", self.period);
        Ok(())
    }

    /// Stop ticking and close the player. Idempotent.
    pub fn stop(&self) {
        let Some(Ticker { stop, handle }) = self.lock_ticker().take() else {
            return;
        };
        drop(stop);
        if handle.join().is_err() {
            warn!("heartbeat thread panicked");
        }
        self.player.close();
        info!("heartbeat stopped after {} beats", self.beats());
    }

    pub fn is_running(&self) -> bool {
        self.lock_ticker().is_some()
    }

    /// Running, and the player still holds a line to beat on.
    pub fn is_live(&self) -> bool {
        self.is_running() && self.player.is_open()
    }

    /// Ticks since construction, including skipped ones.
    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }

    pub fn player(&self) -> &ClipPlayer {
        &self.player
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}

fn beat(player: &ClipPlayer, beats: &AtomicU64) {
    beats.fetch_add(1, Ordering::Relaxed);
    trace!("heartbeat");
    if let Err(e) = player.trigger() {
        match player.state() {
            PlayerState::Closed => warn!("heartbeat skipped, player has no line: {}", e),
            _ => debug!("heartbeat skipped: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::tests::generate_test_wav;
    use crate::device::RecordingDevice;
    use crate::resource::MemoryResourceLoader;

    fn heartbeat(period: Duration) -> (Heartbeat, RecordingDevice) {
        let device = RecordingDevice::new();
        let loader = MemoryResourceLoader::new().with("heartbeat.wav", generate_test_wav(48, 48000));
        let player = ClipPlayer::new("heartbeat", Arc::new(device.clone()), Arc::new(loader));
        (Heartbeat::new(player, "heartbeat.wav", period), device)
    }

    #[test]
    fn first_beat_is_immediate() {
        let (hb, device) = heartbeat(Duration::from_secs(3600));
        hb.start().unwrap();
        thread::sleep(Duration::from_millis(50));

        assert_eq!(hb.beats(), 1);
        assert_eq!(device.starts(), 1);
        hb.stop();
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let (hb, device) = heartbeat(Duration::from_secs(3600));
        hb.start().unwrap();
        hb.start().unwrap();
        assert!(hb.is_running());
        assert_eq!(device.lines_acquired(), 1);

        hb.stop();
        hb.stop();
        assert!(!hb.is_running());
        assert!(!hb.player().is_open());
    }

    #[test]
    fn busy_player_skips_beat() {
        let (hb, device) = heartbeat(Duration::from_millis(20));
        hb.start().unwrap();
        thread::sleep(Duration::from_millis(90));
        hb.stop();

        // Nothing completed the first playback, so later beats found it busy.
        assert!(hb.beats() > 1);
        assert_eq!(device.starts(), 1);
    }

    #[test]
    fn missing_sound_fails_start() {
        let device = RecordingDevice::new();
        let player = ClipPlayer::new(
            "heartbeat",
            Arc::new(device),
            Arc::new(MemoryResourceLoader::new()),
        );
        let hb = Heartbeat::new(player, "heartbeat.wav", Duration::from_secs(1));

        assert!(matches!(hb.start(), Err(FalcoError::ResourceNotFound(_))));
        assert!(!hb.is_running());
    }

    #[test]
    fn unrepresentable_period_beats_once_and_stops() {
        let (hb, device) = heartbeat(Duration::MAX);
        hb.start().unwrap();
        thread::sleep(Duration::from_millis(50));

        assert_eq!(hb.beats(), 1);
        assert_eq!(device.starts(), 1);
        hb.stop();
        assert!(!hb.is_running());
    }

    #[test]
    fn failed_reopen_leaves_heartbeat_dead() {
        let (hb, device) = heartbeat(Duration::from_secs(3600));
        hb.start().unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(hb.is_live());

        device.fail_next_open(FalcoError::DeviceUnavailable("unplugged".to_string()));
        assert!(device.complete_playback());

        assert!(hb.is_running());
        assert!(!hb.is_live());
        hb.stop();
    }
}
