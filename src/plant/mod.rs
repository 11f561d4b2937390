//! Off-target plant: the simulated converter and its feedback ADC.

pub mod adc;
pub mod converter;
