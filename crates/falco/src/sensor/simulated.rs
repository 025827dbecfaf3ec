//! In-process sensor for dry runs and tests.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use super::{MotionListener, MotionSensor};
use crate::error::Result;

#[derive(Default)]
struct Line {
    level: bool,
    listener: Option<Arc<Mutex<MotionListener>>>,
}

/// Emulated input line. Clones drive the same line.
#[derive(Clone, Default)]
pub struct SimulatedSensor {
    line: Arc<Mutex<Line>>,
}

impl SimulatedSensor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Line> {
        self.line.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drive the line high.
    pub fn up(&self) {
        self.set_level(true);
    }

    /// Drive the line low.
    pub fn down(&self) {
        self.set_level(false);
    }

    /// `up()` then `down()`.
    pub fn pulse(&self) {
        self.up();
        self.down();
    }

    pub fn level(&self) -> bool {
        self.lock().level
    }

    pub fn is_subscribed(&self) -> bool {
        self.lock().listener.is_some()
    }

    fn set_level(&self, level: bool) {
        // The listener runs outside the line lock; it may call back into
        // code that unsubscribes this sensor.
        let listener = {
            let mut line = self.lock();
            line.level = level;
            line.listener.clone()
        };
        debug!(level, "simulated sensor");
        if let Some(listener) = listener {
            let mut listener = listener.lock().unwrap_or_else(|e| e.into_inner());
            (*listener)(level);
        }
    }
}

impl MotionSensor for SimulatedSensor {
    fn subscribe(&mut self, listener: MotionListener) -> Result<()> {
        self.lock().listener = Some(Arc::new(Mutex::new(listener)));
        Ok(())
    }

    fn unsubscribe(&mut self) {
        self.lock().listener = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_levels_until_unsubscribed() {
        let levels = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&levels);
        let mut sensor = SimulatedSensor::new();
        sensor
            .subscribe(Box::new(move |level| seen.lock().unwrap().push(level)))
            .unwrap();

        sensor.pulse();
        sensor.unsubscribe();
        sensor.up();

        assert_eq!(*levels.lock().unwrap(), vec![true, false]);
        assert!(sensor.level());
        assert!(!sensor.is_subscribed());
    }
}
