//! adc.rs
//! 10-bit ADC model over the simulated plant.
//!
//! `start()` captures what the hardware would track during the conversion
//! window: the plant's output voltage quantized to counts with one LSB of
//! noise. The conversion time itself is modeled by the sampling thread's
//! delay between `start()` and the conversion-complete handler. The result
//! is exposed as the low/high register pair the sampler combines.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::random_range;

use crate::config::{ADC_CV_DEN, ADC_CV_NUM, ADC_MAX};
use crate::plant::converter::FlybackModel;
use crate::regulator::sampler::ConversionSource;

pub struct SimAdc {
    plant: Arc<Mutex<FlybackModel>>,
    result: u16,
}

impl SimAdc {
    pub fn new(plant: Arc<Mutex<FlybackModel>>) -> Self {
        let mut adc = Self { plant, result: 0 };
        // Free-running: the first conversion is armed at power-on.
        adc.start();
        adc
    }
}

impl ConversionSource for SimAdc {
    fn result(&self) -> (u8, u8) {
        ((self.result & 0xFF) as u8, (self.result >> 8) as u8)
    }

    fn start(&mut self) {
        let vout_cv = self.plant.lock().vout() * 100.0;
        let counts = vout_cv * ADC_CV_DEN as f64 / ADC_CV_NUM as f64;
        let noisy = counts + random_range(-1.0..1.0);
        self.result = noisy.round().clamp(0.0, ADC_MAX as f64) as u16;
    }
}
