//! Shared fixtures for falco integration tests

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use falco::{ClipPlayer, ManualClock, MemoryResourceLoader, MotionController, RecordingDevice};

pub const DETERRENT: &str = "red-tailed-hawk-sound.wav";
pub const HEARTBEAT: &str = "heartbeat.wav";

/// Mono 16-bit sine, in memory.
pub fn test_wav(frames: usize, sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let sample = (t * 440.0 * 2.0 * std::f32::consts::PI).sin();
            writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

pub fn sounds() -> MemoryResourceLoader {
    MemoryResourceLoader::new()
        .with(DETERRENT, test_wav(4800, 48000))
        .with(HEARTBEAT, test_wav(480, 48000))
}

/// 3 Dec 2007 at `h:m`.
pub fn at(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2007, 12, 3)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

pub struct Rig {
    pub controller: MotionController,
    pub device: RecordingDevice,
    pub clock: Arc<ManualClock>,
}

/// Controller on a recording device with the clock pinned to `now`.
pub fn rig(now: NaiveDateTime) -> Rig {
    let device = RecordingDevice::new();
    let player = ClipPlayer::new("deterrent", Arc::new(device.clone()), Arc::new(sounds()));
    let clock = Arc::new(ManualClock::new(now));
    let controller = MotionController::builder(player, DETERRENT)
        .clock(clock.clone())
        .build();
    Rig {
        controller,
        device,
        clock,
    }
}
