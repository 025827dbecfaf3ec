//! PipeWire audio output
//!
//! Each line owns one PipeWire stream running on its own thread with its own
//! main loop. The stream is created by `open()` and negotiated at the clip's
//! native rate and channel count; PipeWire resamples to the graph.
//!
//! ```text
//! ClipPlayer                         PipeWire (PW's RT thread)
//!     │ start()                               │
//!     ▼                                       ▼
//!  playing=true ─────────────────────► process callback
//!                                      copy clip[position..] * gain
//!                                      position reaches end
//!                                             │
//!                                      finished=true
//!                                             │
//!  on_stopped() ◄──── 100ms timer on the line's main loop thread
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use portable_atomic::AtomicF32;
use tracing::{debug, error, info};

use super::{db_to_gain, AudioDevice, AudioLine, FormatHint, PlaybackStopped};
use crate::decode::DecodedAudio;
use crate::error::{FalcoError, Result};

/// How long `open()` waits for the stream to connect.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration for PipeWire output lines
#[derive(Debug, Clone)]
pub struct PipeWireOutputConfig {
    pub name: String,
    /// Graph rate the latency hint is expressed in.
    pub sample_rate: u32,
    /// Maximum frames written per callback.
    pub latency_frames: u32,
}

impl Default for PipeWireOutputConfig {
    fn default() -> Self {
        Self {
            name: "falco".to_string(),
            sample_rate: 48000,
            latency_frames: 256,
        }
    }
}

/// Device handing out PipeWire-backed lines
#[derive(Debug, Clone)]
pub struct PipeWireDevice {
    config: PipeWireOutputConfig,
}

impl PipeWireDevice {
    pub fn new(config: PipeWireOutputConfig) -> Self {
        pipewire::init();
        Self { config }
    }
}

impl AudioDevice for PipeWireDevice {
    fn name(&self) -> &str {
        "pipewire"
    }

    fn acquire_line(&self, hint: &FormatHint) -> Result<Box<dyn AudioLine>> {
        if hint.channels == 0 || hint.channels as usize > pipewire::spa::param::audio::MAX_CHANNELS {
            return Err(FalcoError::DeviceUnavailable(format!(
                "cannot output {} channels",
                hint.channels
            )));
        }
        Ok(Box::new(PipeWireLine {
            config: self.config.clone(),
            hint: *hint,
            shared: Arc::new(LineShared::default()),
            thread_handle: None,
            gain_db: 0.0,
        }))
    }
}

/// State shared between the line, its main loop thread and the RT callback.
struct LineShared {
    running: AtomicBool,
    playing: AtomicBool,
    finished: AtomicBool,
    position: AtomicUsize,
    /// Linear gain applied in the RT callback.
    gain: AtomicF32,
    on_stopped: Mutex<Option<PlaybackStopped>>,
}

impl Default for LineShared {
    fn default() -> Self {
        Self {
            running: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            position: AtomicUsize::new(0),
            gain: AtomicF32::new(1.0),
            on_stopped: Mutex::new(None),
        }
    }
}

impl LineShared {
    fn take_on_stopped(&self) -> Option<PlaybackStopped> {
        self.on_stopped
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}

struct PipeWireLine {
    config: PipeWireOutputConfig,
    hint: FormatHint,
    shared: Arc<LineShared>,
    thread_handle: Option<JoinHandle<()>>,
    gain_db: f32,
}

impl AudioLine for PipeWireLine {
    fn open(&mut self, audio: Arc<DecodedAudio>) -> Result<()> {
        if self.thread_handle.is_some() {
            return Err(FalcoError::DeviceUnavailable("line already open".to_string()));
        }

        self.shared.position.store(0, Ordering::Release);
        self.shared.running.store(true, Ordering::Release);

        let (ready_tx, ready_rx) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let hint = self.hint;

        let handle = thread::Builder::new()
            .name("pipewire-output".to_string())
            .spawn(move || {
                if let Err(e) = run_pipewire_loop(config, hint, audio, shared, ready_tx) {
                    error!("PipeWire output thread failed: {}", e);
                }
            })
            .map_err(|e| FalcoError::DeviceUnavailable(format!("failed to spawn PipeWire thread: {}", e)))?;

        match ready_rx.recv_timeout(CONNECT_TIMEOUT) {
            Ok(Ok(())) => {
                self.thread_handle = Some(handle);
                info!(
                    "PipeWire line open: {} @ {}Hz, {} channels",
                    self.config.name, self.hint.sample_rate, self.hint.channels
                );
                Ok(())
            }
            Ok(Err(reason)) => {
                self.shared.running.store(false, Ordering::Release);
                Err(FalcoError::DeviceUnavailable(reason))
            }
            Err(_) => {
                self.shared.running.store(false, Ordering::Release);
                Err(FalcoError::DeviceUnavailable(
                    "timed out connecting to PipeWire".to_string(),
                ))
            }
        }
    }

    fn rewind(&mut self) {
        self.shared.position.store(0, Ordering::Release);
    }

    fn start(&mut self, on_stopped: PlaybackStopped) -> Result<()> {
        if self.thread_handle.is_none() {
            return Err(FalcoError::NotReady("start()"));
        }
        *self
            .shared
            .on_stopped
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(on_stopped);
        self.shared.finished.store(false, Ordering::Release);
        self.shared.playing.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&mut self) {
        self.shared.playing.store(false, Ordering::Release);
        drop(self.shared.take_on_stopped());
    }

    fn close(&mut self) {
        self.stop();
        self.shared.running.store(false, Ordering::Release);
        // close() can run on this line's own main loop thread (from the stop
        // notification), so the thread is detached rather than joined.
        if self.thread_handle.take().is_some() {
            debug!("PipeWire line closed");
        }
    }

    fn set_gain_db(&mut self, db: f32) {
        self.gain_db = db;
        self.shared
            .gain
            .store(db_to_gain(db) as f32, Ordering::Relaxed);
    }

    fn gain_db(&self) -> f32 {
        self.gain_db
    }
}

impl Drop for PipeWireLine {
    fn drop(&mut self) {
        self.close();
    }
}

/// Run the PipeWire main loop for one line (called from thread)
fn run_pipewire_loop(
    config: PipeWireOutputConfig,
    hint: FormatHint,
    audio: Arc<DecodedAudio>,
    shared: Arc<LineShared>,
    ready: mpsc::Sender<std::result::Result<(), String>>,
) -> std::result::Result<(), String> {
    let result = connect_and_run(config, hint, audio, shared, &ready);
    if let Err(e) = &result {
        let _ = ready.send(Err(e.clone()));
    }
    result
}

fn connect_and_run(
    config: PipeWireOutputConfig,
    hint: FormatHint,
    audio: Arc<DecodedAudio>,
    shared: Arc<LineShared>,
    ready: &mpsc::Sender<std::result::Result<(), String>>,
) -> std::result::Result<(), String> {
    use pipewire as pw;
    use pw::spa::pod::Pod;
    use pw::{properties::properties, spa};

    let mainloop = pw::main_loop::MainLoopRc::new(None)
        .map_err(|e| format!("Failed to create main loop: {}", e))?;

    let context = pw::context::ContextRc::new(&mainloop, None)
        .map_err(|e| format!("Failed to create context: {}", e))?;

    let core = context
        .connect_rc(None)
        .map_err(|e| format!("Failed to connect to PipeWire: {}", e))?;

    let mut props = properties! {
        *pw::keys::MEDIA_TYPE => "Audio",
        *pw::keys::MEDIA_ROLE => "Notification",
        *pw::keys::MEDIA_CATEGORY => "Playback",
        *pw::keys::AUDIO_CHANNELS => hint.channels.to_string(),
    };
    if config.latency_frames > 0 {
        let latency = format!("{}/{}", config.latency_frames, config.sample_rate);
        props.insert("node.latency", latency.as_str());
    }

    let stream = pw::stream::StreamBox::new(&core, &config.name, props)
        .map_err(|e| format!("Failed to create stream: {}", e))?;

    let channels = hint.channels as usize;
    let sample_size = std::mem::size_of::<f32>();
    let stride = sample_size * channels;
    let target_frames = config.latency_frames.max(1) as usize;
    let total_frames = audio.frames();

    // Runs in PipeWire's RT thread: no locks, no allocation.
    let rt_shared = Arc::clone(&shared);
    let _listener = stream
        .add_local_listener_with_user_data(audio)
        .process(move |stream, audio| {
            let Some(mut buffer) = stream.dequeue_buffer() else {
                return;
            };

            let requested = buffer.requested() as usize;
            let datas = buffer.datas_mut();
            let Some(data) = datas.first_mut() else {
                return;
            };
            let Some(slice) = data.data() else {
                return;
            };

            let max_frames = slice.len() / stride;
            let n_frames = if requested > 0 {
                target_frames.min(requested).min(max_frames)
            } else {
                target_frames.min(max_frames)
            };

            let playing = rt_shared.playing.load(Ordering::Acquire);
            let gain = rt_shared.gain.load(Ordering::Relaxed);
            let mut position = rt_shared.position.load(Ordering::Acquire);

            for i in 0..n_frames {
                let active = playing && position < total_frames;
                for c in 0..channels {
                    let sample = if active {
                        audio.samples[position * channels + c] * gain
                    } else {
                        0.0
                    };
                    let start = i * stride + c * sample_size;
                    slice[start..start + sample_size].copy_from_slice(&sample.to_le_bytes());
                }
                if active {
                    position += 1;
                }
            }

            if playing {
                rt_shared.position.store(position, Ordering::Release);
                if position >= total_frames {
                    rt_shared.playing.store(false, Ordering::Release);
                    rt_shared.finished.store(true, Ordering::Release);
                }
            }

            let chunk = data.chunk_mut();
            *chunk.offset_mut() = 0;
            *chunk.stride_mut() = stride as i32;
            *chunk.size_mut() = (stride * n_frames) as u32;
        })
        .register()
        .map_err(|e| format!("Failed to register listener: {}", e))?;

    let mut audio_info = spa::param::audio::AudioInfoRaw::new();
    audio_info.set_format(spa::param::audio::AudioFormat::F32LE);
    audio_info.set_rate(hint.sample_rate);
    audio_info.set_channels(hint.channels as u32);

    let mut position = [0u32; spa::param::audio::MAX_CHANNELS];
    if hint.channels == 1 {
        position[0] = pipewire::spa::sys::SPA_AUDIO_CHANNEL_MONO;
    } else {
        position[0] = pipewire::spa::sys::SPA_AUDIO_CHANNEL_FL;
        position[1] = pipewire::spa::sys::SPA_AUDIO_CHANNEL_FR;
    }
    audio_info.set_position(position);

    let values: Vec<u8> = pw::spa::pod::serialize::PodSerializer::serialize(
        std::io::Cursor::new(Vec::new()),
        &pw::spa::pod::Value::Object(pw::spa::pod::Object {
            type_: pipewire::spa::sys::SPA_TYPE_OBJECT_Format,
            id: pipewire::spa::sys::SPA_PARAM_EnumFormat,
            properties: audio_info.into(),
        }),
    )
    .map_err(|e| format!("Failed to serialize format: {}", e))?
    .0
    .into_inner();

    let mut params = [Pod::from_bytes(&values).ok_or_else(|| "Failed to create Pod from bytes".to_string())?];

    stream
        .connect(
            spa::utils::Direction::Output,
            None,
            pw::stream::StreamFlags::AUTOCONNECT
                | pw::stream::StreamFlags::MAP_BUFFERS
                | pw::stream::StreamFlags::RT_PROCESS,
            &mut params,
        )
        .map_err(|e| format!("Failed to connect stream: {}", e))?;

    // Completion and shutdown are polled off the RT thread.
    let mainloop_weak = mainloop.downgrade();
    let timer = mainloop.loop_().add_timer(move |_| {
        if shared.finished.swap(false, Ordering::AcqRel) {
            if let Some(on_stopped) = shared.take_on_stopped() {
                on_stopped();
            }
        }
        if !shared.running.load(Ordering::Acquire) {
            if let Some(ml) = mainloop_weak.upgrade() {
                ml.quit();
            }
        }
    });

    timer
        .update_timer(
            Some(Duration::from_millis(100)),
            Some(Duration::from_millis(100)),
        )
        .into_result()
        .map_err(|e| format!("Failed to set timer: {}", e))?;

    let _ = ready.send(Ok(()));
    mainloop.run();

    debug!("PipeWire line main loop exited");
    Ok(())
}
