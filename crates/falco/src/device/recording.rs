//! Test double that records line activity and lets tests finish playbacks by hand.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{AudioDevice, AudioLine, FormatHint, PlaybackStopped};
use crate::decode::DecodedAudio;
use crate::error::{FalcoError, Result};

/// One thing a line was asked to do. The `usize` is the line id.
#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    Acquired(usize),
    Opened(usize),
    Started(usize),
    Stopped(usize),
    Closed(usize),
    Gain(usize, f32),
}

#[derive(Default)]
struct Recorder {
    events: Vec<LineEvent>,
    next_line: usize,
    pending: VecDeque<(usize, PlaybackStopped)>,
    fail_acquire: VecDeque<FalcoError>,
    fail_open: VecDeque<FalcoError>,
}

/// Shared handle; clones observe the same recording.
#[derive(Clone, Default)]
pub struct RecordingDevice {
    recorder: Arc<Mutex<Recorder>>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recorder> {
        self.recorder.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn events(&self) -> Vec<LineEvent> {
        self.lock().events.clone()
    }

    /// Number of playbacks started across all lines.
    pub fn starts(&self) -> usize {
        self.count(|e| matches!(e, LineEvent::Started(_)))
    }

    pub fn lines_acquired(&self) -> usize {
        self.count(|e| matches!(e, LineEvent::Acquired(_)))
    }

    pub fn closes(&self) -> usize {
        self.count(|e| matches!(e, LineEvent::Closed(_)))
    }

    fn count(&self, pred: impl Fn(&LineEvent) -> bool) -> usize {
        self.lock().events.iter().filter(|e| pred(e)).count()
    }

    /// Gain most recently applied to any line.
    pub fn last_gain_db(&self) -> Option<f32> {
        self.lock().events.iter().rev().find_map(|e| match e {
            LineEvent::Gain(_, db) => Some(*db),
            _ => None,
        })
    }

    /// Playbacks started and not yet finished or cut short.
    pub fn playing(&self) -> usize {
        self.lock().pending.len()
    }

    /// Finish the oldest running playback, firing its stop notification on
    /// the calling thread. Returns false if nothing was playing.
    pub fn complete_playback(&self) -> bool {
        let next = self.lock().pending.pop_front();
        match next {
            Some((_, on_stopped)) => {
                on_stopped();
                true
            }
            None => false,
        }
    }

    pub fn fail_next_acquire(&self, err: FalcoError) {
        self.lock().fail_acquire.push_back(err);
    }

    pub fn fail_next_open(&self, err: FalcoError) {
        self.lock().fail_open.push_back(err);
    }
}

impl AudioDevice for RecordingDevice {
    fn name(&self) -> &str {
        "recording"
    }

    fn acquire_line(&self, _hint: &FormatHint) -> Result<Box<dyn AudioLine>> {
        let mut recorder = self.lock();
        if let Some(err) = recorder.fail_acquire.pop_front() {
            return Err(err);
        }
        let id = recorder.next_line;
        recorder.next_line += 1;
        recorder.events.push(LineEvent::Acquired(id));
        Ok(Box::new(RecordingLine {
            id,
            recorder: Arc::clone(&self.recorder),
            opened: false,
            gain_db: 0.0,
        }))
    }
}

struct RecordingLine {
    id: usize,
    recorder: Arc<Mutex<Recorder>>,
    opened: bool,
    gain_db: f32,
}

impl RecordingLine {
    fn lock(&self) -> MutexGuard<'_, Recorder> {
        self.recorder.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn drop_pending(&self) {
        let id = self.id;
        self.lock().pending.retain(|(line, _)| *line != id);
    }
}

impl AudioLine for RecordingLine {
    fn open(&mut self, _audio: Arc<DecodedAudio>) -> Result<()> {
        let mut recorder = self.lock();
        if let Some(err) = recorder.fail_open.pop_front() {
            return Err(err);
        }
        recorder.events.push(LineEvent::Opened(self.id));
        drop(recorder);
        self.opened = true;
        Ok(())
    }

    fn rewind(&mut self) {}

    fn start(&mut self, on_stopped: PlaybackStopped) -> Result<()> {
        if !self.opened {
            return Err(FalcoError::NotReady("start()"));
        }
        let mut recorder = self.lock();
        recorder.events.push(LineEvent::Started(self.id));
        recorder.pending.push_back((self.id, on_stopped));
        Ok(())
    }

    fn stop(&mut self) {
        self.drop_pending();
        self.lock().events.push(LineEvent::Stopped(self.id));
    }

    fn close(&mut self) {
        self.drop_pending();
        self.opened = false;
        self.lock().events.push(LineEvent::Closed(self.id));
    }

    fn set_gain_db(&mut self, db: f32) {
        self.gain_db = db;
        self.lock().events.push(LineEvent::Gain(self.id, db));
    }

    fn gain_db(&self) -> f32 {
        self.gain_db
    }
}
