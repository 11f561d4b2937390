//! config.rs
//! Control-law and converter constants.
//!
//! Everything the loop's arithmetic depends on lives here as an explicit
//! compile-time constant, so the same control law runs identically on the
//! simulated plant and in the test harness. Gains with fractional values are
//! expressed as integer ratios to keep the PID fully deterministic.

/// Feedback ADC resolution (10-bit successive approximation).
pub const ADC_BITS: u32 = 10;

/// Largest raw reading the sampler can latch.
pub const ADC_MAX: u16 = (1 << ADC_BITS) - 1;

/// Hundredths of a volt per ADC count, as the ratio 296/100 (2.96 cV/count).
pub const ADC_CV_NUM: i32 = 296;
pub const ADC_CV_DEN: i32 = 100;

/// Control period in microseconds (timer overflow rate). The integral-gain
/// scaling below is baked against this value; the period is a design
/// constant, never measured at runtime.
pub const CONTROL_PERIOD_US: i64 = 2048;

/// Proportional gain.
pub const P_GAIN: i32 = 4;

/// Integral gain 2.5, as the ratio 5/2.
pub const I_GAIN_NUM: i32 = 5;
pub const I_GAIN_DEN: i32 = 2;

/// Derivative gain.
pub const D_GAIN: i32 = 0;

/// Anti-windup clamp on the integral accumulator.
pub const INTEGRAL_LOWER_LIMIT: i32 = -500;
pub const INTEGRAL_UPPER_LIMIT: i32 = 500;

/// The integral accumulator is wiped every this many control periods
/// (488 x 2048 us, roughly one second of wall time).
pub const INTEGRAL_RESET_CYCLES: u32 = 488;

/// Setpoint bounds and adjustment step, in hundredths of a volt.
pub const SETPOINT_INCREMENT_CV: i32 = 50;
pub const MAX_SETPOINT_CV: i32 = 3000;
pub const INITIAL_SETPOINT_CV: i32 = 100;

/// Button debounce window, measured in control-period ticks, and the
/// saturation cap that keeps the tick counters from overflowing.
pub const DEBOUNCE_TICKS: u32 = 100;
pub const DEBOUNCE_MAX: u32 = 1000;

/// PWM counter period; the compare register must stay strictly below this
/// or the switch sticks at 100% duty on this counter topology.
pub const PWM_PERIOD: u16 = 144;

/// Divides the summed control terms down into PWM compare counts.
pub const OUTPUT_DIVISOR: i32 = 14;

/// Simulated plant parameters: the converter the original firmware drove.
pub const VIN_MIN_V: f64 = 24.0;
pub const VIN_MAX_V: f64 = 36.0;
pub const VIN_NOMINAL_V: f64 = 30.0;

/// Free-running conversion time of the simulated ADC (us).
pub const ADC_CONVERSION_US: u64 = 104;
