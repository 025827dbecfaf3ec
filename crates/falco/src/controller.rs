//! Coordinator between the motion sensor, the deterrent policy and the
//! deterrent player.
//!
//! Lock order is controller state → player. The player's stop notification
//! only ever takes the player lock, and the sensor is (un)subscribed outside
//! the controller lock because GPIO unsubscription waits for the interrupt
//! thread, which may itself be blocked in [`MotionController::moved`].

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{FalcoError, Result};
use crate::player::ClipPlayer;
use crate::policy::{DeterrentPolicy, PolicyDecision};
use crate::sensor::{rising_edge, MotionSensor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    Unstarted,
    Ready,
}

/// What a call to [`MotionController::moved`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionOutcome {
    Fired,
    Suppressed(PolicyDecision),
}

struct ControllerState {
    phase: ControllerPhase,
    last_fired_at: Option<NaiveDateTime>,
}

struct ControllerInner {
    sound: String,
    player: ClipPlayer,
    policy: DeterrentPolicy,
    clock: Arc<dyn Clock>,
    state: Mutex<ControllerState>,
    sensor: Mutex<Option<Box<dyn MotionSensor>>>,
}

impl ControllerInner {
    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_sensor(&self) -> MutexGuard<'_, Option<Box<dyn MotionSensor>>> {
        self.sensor.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Shared handle; clones drive the same controller.
#[derive(Clone)]
pub struct MotionController {
    inner: Arc<ControllerInner>,
}

/// Non-owning handle, used by the control surface and the sensor listener.
#[derive(Clone)]
pub struct WeakMotionController {
    inner: Weak<ControllerInner>,
}

impl WeakMotionController {
    pub fn upgrade(&self) -> Option<MotionController> {
        self.inner.upgrade().map(|inner| MotionController { inner })
    }
}

pub struct MotionControllerBuilder {
    player: ClipPlayer,
    sound: String,
    policy: DeterrentPolicy,
    clock: Arc<dyn Clock>,
    sensor: Option<Box<dyn MotionSensor>>,
}

impl MotionControllerBuilder {
    pub fn policy(mut self, policy: DeterrentPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn sensor(mut self, sensor: Box<dyn MotionSensor>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    pub fn build(self) -> MotionController {
        MotionController {
            inner: Arc::new(ControllerInner {
                sound: self.sound,
                player: self.player,
                policy: self.policy,
                clock: self.clock,
                state: Mutex::new(ControllerState {
                    phase: ControllerPhase::Unstarted,
                    last_fired_at: None,
                }),
                sensor: Mutex::new(self.sensor),
            }),
        }
    }
}

impl MotionController {
    /// `player` plays `sound` whenever motion is let through.
    pub fn builder(player: ClipPlayer, sound: impl Into<String>) -> MotionControllerBuilder {
        MotionControllerBuilder {
            player,
            sound: sound.into(),
            policy: DeterrentPolicy::default(),
            clock: Arc::new(SystemClock),
            sensor: None,
        }
    }

    pub fn downgrade(&self) -> WeakMotionController {
        WeakMotionController {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Open the deterrent player and subscribe to the sensor.
    ///
    /// A no-op on a started controller. On error the controller stays
    /// unstarted.
    pub fn startup(&self) -> Result<()> {
        {
            let mut state = self.inner.lock_state();
            if state.phase == ControllerPhase::Ready {
                debug!("startup() on a started controller");
                return Ok(());
            }
            self.inner.player.open(&self.inner.sound)?;
            state.phase = ControllerPhase::Ready;
        }

        if let Err(e) = self.subscribe_sensor() {
            self.shutdown();
            return Err(e);
        }
        info!("controller ready with '{}'", self.inner.sound);
        Ok(())
    }

    /// Subscribes while holding the sensor lock, then re-checks the phase: a
    /// shutdown that ran between opening and subscribing must not leave the
    /// sensor delivering to an unstarted controller.
    fn subscribe_sensor(&self) -> Result<()> {
        let mut sensor = self.inner.lock_sensor();
        let Some(sensor) = sensor.as_mut() else {
            return Ok(());
        };
        let controller = self.downgrade();
        sensor.subscribe(rising_edge(move || {
            let Some(controller) = controller.upgrade() else {
                return;
            };
            if let Err(e) = controller.moved() {
                warn!("motion ignored: {}", e);
            }
        }))?;

        if self.inner.lock_state().phase != ControllerPhase::Ready {
            debug!("shut down while subscribing; dropping the subscription");
            sensor.unsubscribe();
            return Err(FalcoError::NotReady("startup()"));
        }
        Ok(())
    }

    /// Handle one motion event. Callable from any thread.
    ///
    /// Policy evaluation, the trigger and the `last_fired_at` update happen
    /// under one lock, so concurrent events inside a cooldown window produce
    /// a single playback.
    pub fn moved(&self) -> Result<MotionOutcome> {
        info!("motion detected");
        let mut state = self.inner.lock_state();
        if state.phase != ControllerPhase::Ready {
            return Err(FalcoError::NotReady("moved()"));
        }

        let now = self.inner.clock.now();
        match self.inner.policy.evaluate(now, state.last_fired_at) {
            PolicyDecision::Fire => {
                self.inner.player.trigger()?;
                state.last_fired_at = Some(now);
                Ok(MotionOutcome::Fired)
            }
            decision => {
                info!(reason = %decision, "too early or not in day light - I am muted");
                Ok(MotionOutcome::Suppressed(decision))
            }
        }
    }

    /// Play the deterrent now, bypassing the policy and leaving
    /// `last_fired_at` untouched.
    pub fn play(&self) -> Result<()> {
        let state = self.inner.lock_state();
        if state.phase != ControllerPhase::Ready {
            return Err(FalcoError::NotReady("play()"));
        }
        self.inner.player.trigger()
    }

    /// Unsubscribe the sensor and close the player. Idempotent.
    pub fn shutdown(&self) {
        if let Some(sensor) = self.inner.lock_sensor().as_mut() {
            sensor.unsubscribe();
        }

        let mut state = self.inner.lock_state();
        self.inner.player.close();
        if state.phase == ControllerPhase::Ready {
            info!("controller shut down");
        }
        state.phase = ControllerPhase::Unstarted;
    }

    /// Started, and the deterrent player still holds a line.
    pub fn is_live(&self) -> bool {
        let state = self.inner.lock_state();
        state.phase == ControllerPhase::Ready && self.inner.player.is_open()
    }

    pub fn phase(&self) -> ControllerPhase {
        self.inner.lock_state().phase
    }

    pub fn last_fired_at(&self) -> Option<NaiveDateTime> {
        self.inner.lock_state().last_fired_at
    }

    pub fn set_volume(&self, gain: f64) -> Result<()> {
        self.inner.player.set_volume(gain)
    }

    pub fn get_volume(&self) -> f64 {
        self.inner.player.get_volume()
    }

    pub fn player(&self) -> &ClipPlayer {
        &self.inner.player
    }
}
