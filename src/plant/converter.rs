//! converter.rs
//! Simulated flyback converter for off-target runs.
//!
//! First-order output-voltage response to the commanded duty cycle, with the
//! disturbances the regulator exists to reject: a random-walk input voltage
//! inside the 24-36 V design window and occasional load steps. The ideal
//! flyback transfer Vout = Vin * n * D / (1 - D) sets the settling target.

use rand::random_range;

use crate::config::{VIN_MAX_V, VIN_MIN_V, VIN_NOMINAL_V};

/// Secondary/primary turns ratio of the simulated transformer.
const TURNS_RATIO: f64 = 1.0;

/// Base output time constant (s); heavier loads respond slower.
const TAU_S: f64 = 0.010;

/// Probability per step of a load step event.
const LOAD_STEP_PROB: f64 = 0.001;

pub struct FlybackModel {
    vin_v: f64,
    vout_v: f64,
    load_ohms: f64,
}

impl FlybackModel {
    pub fn new() -> Self {
        Self {
            vin_v: VIN_NOMINAL_V,
            vout_v: 0.0,
            load_ohms: 24.0,
        }
    }

    /// Advance the plant by `dt_s` under the given duty cycle.
    pub fn step(&mut self, duty: f64, dt_s: f64) {
        // Input-voltage random walk within the design window.
        self.vin_v = (self.vin_v + random_range(-0.05..0.05)).clamp(VIN_MIN_V, VIN_MAX_V);

        // Occasional load step (light to heavy and back).
        if random_range(0.0..1.0) < LOAD_STEP_PROB {
            self.load_ohms = random_range(12.0..120.0);
        }

        // Keep the transfer function out of its pole; real converters never
        // run at D=1 either.
        let d = duty.clamp(0.0, 0.95);
        let target = self.vin_v * TURNS_RATIO * d / (1.0 - d);

        let tau = TAU_S * (1.0 + 10.0 / self.load_ohms);
        self.vout_v += (target - self.vout_v) * (dt_s / tau).min(1.0);
        self.vout_v = self.vout_v.max(0.0);
    }

    #[inline]
    pub fn vout(&self) -> f64 {
        self.vout_v
    }

    #[inline]
    pub fn vin(&self) -> f64 {
        self.vin_v
    }

    #[inline]
    pub fn load_ohms(&self) -> f64 {
        self.load_ohms
    }
}

impl Default for FlybackModel {
    fn default() -> Self {
        Self::new()
    }
}
