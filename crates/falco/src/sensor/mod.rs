//! Motion sensor collaborators.
//!
//! A sensor pushes its line level to one listener. The controller wraps its
//! `moved()` in [`rising_edge`] so only low→high transitions count as motion.

mod simulated;

#[cfg(feature = "gpio")]
mod gpio;

pub use simulated::SimulatedSensor;

#[cfg(feature = "gpio")]
pub use gpio::GpioSensor;

use crate::error::Result;

/// Receives the sensor line level (`true` = high) on every change.
pub type MotionListener = Box<dyn FnMut(bool) + Send + 'static>;

pub trait MotionSensor: Send {
    /// Replace any previous listener.
    fn subscribe(&mut self, listener: MotionListener) -> Result<()>;

    /// Stop delivering levels. Idempotent.
    fn unsubscribe(&mut self);
}

/// Adapt `on_motion` into a listener that fires only on low→high.
pub fn rising_edge(mut on_motion: impl FnMut() + Send + 'static) -> MotionListener {
    let mut high = false;
    Box::new(move |level| {
        if level && !high {
            on_motion();
        }
        high = level;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn only_rising_edges_count() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let mut listener = rising_edge(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        for level in [false, true, true, false, false, true] {
            listener(level);
        }
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
