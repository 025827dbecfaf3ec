//! Raspberry Pi GPIO input (PIR sensor wired to a pull-down pin).

use rppal::gpio::{Gpio, InputPin, Level, Trigger};
use tracing::{info, warn};

use super::{MotionListener, MotionSensor};
use crate::error::{FalcoError, Result};

/// BCM 23, header pin 16.
pub const DEFAULT_BCM_PIN: u8 = 23;

pub struct GpioSensor {
    pin: InputPin,
}

impl GpioSensor {
    /// Claim `bcm_pin` as a pull-down input.
    pub fn new(bcm_pin: u8) -> Result<Self> {
        let gpio = Gpio::new()
            .map_err(|e| FalcoError::DeviceUnavailable(format!("GPIO not accessible: {}", e)))?;
        let pin = gpio
            .get(bcm_pin)
            .map_err(|e| FalcoError::DeviceUnavailable(format!("GPIO {} unavailable: {}", bcm_pin, e)))?
            .into_input_pulldown();
        info!("motion sensor on BCM {}", bcm_pin);
        Ok(Self { pin })
    }
}

impl MotionSensor for GpioSensor {
    fn subscribe(&mut self, mut listener: MotionListener) -> Result<()> {
        let bcm = self.pin.pin();
        self.pin
            .set_async_interrupt(Trigger::Both, move |level: Level| listener(level == Level::High))
            .map_err(|e| FalcoError::DeviceUnavailable(format!("GPIO {} interrupt: {}", bcm, e)))
    }

    fn unsubscribe(&mut self) {
        if let Err(e) = self.pin.clear_async_interrupt() {
            warn!("failed to clear GPIO {} interrupt: {}", self.pin.pin(), e);
        }
    }
}
