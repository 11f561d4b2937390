//! setpoint.rs
//! User setpoint store with tick-counted debounce.
//!
//! `increase()` / `decrease()` are the two edge handlers; each is accepted
//! only when its button's debounce counter has reached the configured window
//! AND the adjusted setpoint stays within `[0, max]`. Rejection is silent:
//! rapid repeated edges inside one window coalesce into at most one
//! acceptance (level debouncing, not edge queuing). The control tick calls
//! `tick()` exactly once per period, which saturating-increments both
//! counters regardless of button activity.

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use crate::config::{DEBOUNCE_MAX, DEBOUNCE_TICKS, MAX_SETPOINT_CV, SETPOINT_INCREMENT_CV};

/// Per-button debounce counter: control-period ticks since the last accepted
/// adjustment. Written by its button handler (reset on accept) and by the
/// control tick (increment); the increment is a single atomic read-modify-write
/// so a reset landing mid-tick is never overwritten with a stale count.
struct DebounceState {
    cycles_since_accepted: AtomicU32,
}

impl DebounceState {
    const fn new() -> Self {
        Self { cycles_since_accepted: AtomicU32::new(0) }
    }

    #[inline]
    fn elapsed(&self) -> u32 {
        self.cycles_since_accepted.load(Ordering::Acquire)
    }

    #[inline]
    fn reset(&self) {
        self.cycles_since_accepted.store(0, Ordering::Release);
    }

    /// Saturating increment; the cap keeps an idle counter from wrapping.
    #[inline]
    fn tick(&self, max: u32) {
        let _ = self
            .cycles_since_accepted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cycles| {
                (cycles < max).then_some(cycles + 1)
            });
    }
}

/// Setpoint cell plus both debounced adjustment handlers.
///
/// The setpoint is read atomically once per control period; a race with an
/// adjustment simply means the loop acts on a one-period-old value.
pub struct SetpointStore {
    setpoint_cv: AtomicI32,
    up: DebounceState,
    down: DebounceState,
    increment_cv: i32,
    max_cv: i32,
    debounce_ticks: u32,
    debounce_max: u32,
}

impl SetpointStore {
    pub fn new(initial_cv: i32) -> Self {
        Self::with_limits(
            initial_cv,
            SETPOINT_INCREMENT_CV,
            MAX_SETPOINT_CV,
            DEBOUNCE_TICKS,
            DEBOUNCE_MAX,
        )
    }

    pub fn with_limits(
        initial_cv: i32,
        increment_cv: i32,
        max_cv: i32,
        debounce_ticks: u32,
        debounce_max: u32,
    ) -> Self {
        Self {
            setpoint_cv: AtomicI32::new(initial_cv.clamp(0, max_cv)),
            up: DebounceState::new(),
            down: DebounceState::new(),
            increment_cv,
            max_cv,
            debounce_ticks,
            debounce_max,
        }
    }

    /// Voltage-up edge handler. Returns whether the adjustment was accepted;
    /// callers use this only for tracing, the hardware sees nothing either way.
    pub fn increase(&self) -> bool {
        if self.up.elapsed() < self.debounce_ticks {
            return false;
        }
        let current = self.setpoint_cv.load(Ordering::Acquire);
        if current > self.max_cv - self.increment_cv {
            return false;
        }
        self.setpoint_cv.store(current + self.increment_cv, Ordering::Release);
        self.up.reset();
        true
    }

    /// Voltage-down edge handler; symmetric with `increase()`.
    pub fn decrease(&self) -> bool {
        if self.down.elapsed() < self.debounce_ticks {
            return false;
        }
        let current = self.setpoint_cv.load(Ordering::Acquire);
        if current < self.increment_cv {
            return false;
        }
        self.setpoint_cv.store(current - self.increment_cv, Ordering::Release);
        self.down.reset();
        true
    }

    /// Called exactly once per control period, for both buttons, whether or
    /// not an edge occurred.
    pub fn tick(&self) {
        self.up.tick(self.debounce_max);
        self.down.tick(self.debounce_max);
    }

    /// Current target, in hundredths of a volt.
    #[inline]
    pub fn setpoint(&self) -> i32 {
        self.setpoint_cv.load(Ordering::Acquire)
    }
}
