//! pwm.rs
//! PWM actuator: a free-running counter/compare pair.
//!
//! The period register is fixed at initialization (it sets the switching
//! frequency); only the compare register changes at runtime. The actuator
//! itself enforces nothing: the controller's clamp guarantees
//! `compare < period`, and this module only debug-asserts that invariant at
//! the write. A compare value at or above the period would stick the switch
//! at 100% duty on this counter topology.

use std::sync::atomic::{AtomicU16, Ordering};

use crate::config::PWM_PERIOD;

pub struct PwmActuator {
    period: u16,
    compare: AtomicU16,
}

impl PwmActuator {
    pub fn new() -> Self {
        Self::with_period(PWM_PERIOD)
    }

    pub fn with_period(period: u16) -> Self {
        Self {
            period,
            compare: AtomicU16::new(0),
        }
    }

    /// Write the actuation command into the compare register. Single-writer:
    /// only the control tick calls this.
    #[inline]
    pub fn write_compare(&self, value: u16) {
        debug_assert!(value < self.period, "compare {} >= period {}", value, self.period);
        self.compare.store(value, Ordering::Release);
    }

    #[inline]
    pub fn compare(&self) -> u16 {
        self.compare.load(Ordering::Acquire)
    }

    #[inline]
    pub fn period(&self) -> u16 {
        self.period
    }

    /// Duty cycle as a fraction, for the plant model and the display.
    #[inline]
    pub fn duty(&self) -> f64 {
        self.compare() as f64 / self.period as f64
    }
}

impl Default for PwmActuator {
    fn default() -> Self {
        Self::new()
    }
}
