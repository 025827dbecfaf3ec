//! Transport-agnostic command façade over the motion controller.

pub mod http;

use tracing::info;

use crate::controller::{MotionController, MotionOutcome, WeakMotionController};
use crate::error::{FalcoError, Result};

/// The five remote operations. Holds the controller weakly so a surface
/// outliving its controller reports `NotReady` instead of keeping it alive.
#[derive(Clone)]
pub struct ControlSurface {
    controller: WeakMotionController,
}

impl ControlSurface {
    pub fn new(controller: &MotionController) -> Self {
        Self {
            controller: controller.downgrade(),
        }
    }

    fn controller(&self, operation: &'static str) -> Result<MotionController> {
        self.controller
            .upgrade()
            .ok_or(FalcoError::NotReady(operation))
    }

    /// Policy-gated motion, as if the sensor fired.
    pub fn move_(&self) -> Result<MotionOutcome> {
        self.controller("move()")?.moved()
    }

    /// Play now, ignoring cooldown and daylight.
    pub fn play(&self) -> Result<()> {
        info!("forced play");
        self.controller("play()")?.play()
    }

    /// Shut the controller down; the daemon notices and starts it again.
    pub fn reinit(&self) -> Result<()> {
        info!("reinit requested");
        self.controller("reinit()")?.shutdown();
        Ok(())
    }

    pub fn set_volume(&self, gain: f64) -> Result<()> {
        self.controller("setVolume()")?.set_volume(gain)
    }

    pub fn get_volume(&self) -> Result<f64> {
        Ok(self.controller("getVolume()")?.get_volume())
    }
}
