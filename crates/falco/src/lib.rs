//! Falco: motion-triggered bird-of-prey deterrent
//!
//! Watches a motion sensor line and, when motion is detected inside the
//! daylight window and outside the cooldown, plays a short hawk call. A
//! heartbeat sound plays periodically on its own line, and a control surface
//! lets an operator force playback, change volume or reinitialize.
//!
//! - **ClipPlayer** (`player`): one exclusive audio line per sound, reopened
//!   after every playback
//! - **DeterrentPolicy** (`policy`): cooldown and daylight gate
//! - **MotionController** (`controller`): serializes triggers from the sensor
//!   and the control surface
//! - **Heartbeat** (`heartbeat`): fixed-rate liveness sound
//! - **ControlSurface** (`control`): move / play / reinit / volume, with an
//!   HTTP adapter

pub mod clock;
pub mod control;
pub mod controller;
pub mod daemon;
pub mod decode;
pub mod device;
pub mod error;
pub mod heartbeat;
pub mod player;
pub mod policy;
pub mod resource;
pub mod sensor;
pub mod telemetry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use control::ControlSurface;
pub use controller::{ControllerPhase, MotionController, MotionOutcome, WeakMotionController};
pub use daemon::FalcoDaemon;
pub use decode::{decode_audio, decode_wav, DecodedAudio};
pub use device::{AudioDevice, AudioLine, FormatHint, LineEvent, RecordingDevice, SilentDevice};
pub use error::{FalcoError, Result};
pub use heartbeat::Heartbeat;
pub use player::{ClipPlayer, PlayerState};
pub use policy::{DeterrentPolicy, PolicyDecision};
pub use resource::{FileResourceLoader, MemoryResourceLoader, ResourceLoader, SoundResource};
pub use sensor::{MotionSensor, SimulatedSensor};
