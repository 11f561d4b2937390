//! pid.rs
//! Fixed-point PID control law for the duty-cycle loop.
//!
//! All arithmetic is integer so one invocation is deterministic and cheap
//! enough to run inside the control-period handler. Three mechanisms keep the
//! output bounded:
//! - integral accumulator clamped to `[integral_min, integral_max]` (anti-windup),
//! - final command clamped to `[0, pwm_period - 1]`,
//! - periodic wipe of the accumulator every `reset_cycles` invocations
//!   (drift mitigation, nominally once per second of wall time).

/// Builder-style configuration for the control law.
///
/// `new()` loads the converter's production constants from [`crate::config`];
/// the `with_*` methods exist so the harness can run the same law with
/// identity scaling or a wider PWM range.
#[derive(Debug, Clone)]
pub struct PidConfig {
    pub kp: i32,
    pub ki_num: i32,
    pub ki_den: i32,
    pub kd: i32,
    /// Control period in microseconds; part of the integral-step scaling.
    pub period_us: i64,
    pub integral_min: i32,
    pub integral_max: i32,
    /// Invocations between integral wipes; 0 disables the wipe.
    pub reset_cycles: u32,
    /// Setpoint-units -> ADC-counts conversion, as a ratio.
    pub scale_num: i32,
    pub scale_den: i32,
    /// Add the raw reading to the summed terms before division. Reduces
    /// steady-state droop by biasing the command toward the operating point.
    pub feedforward: bool,
    /// Divides the summed control terms down to PWM compare counts.
    pub output_divisor: i32,
    /// Compare values are clamped strictly below this.
    pub pwm_period: u16,
}

impl PidConfig {
    pub fn new() -> Self {
        use crate::config::*;
        Self {
            kp: P_GAIN,
            ki_num: I_GAIN_NUM,
            ki_den: I_GAIN_DEN,
            kd: D_GAIN,
            period_us: CONTROL_PERIOD_US,
            integral_min: INTEGRAL_LOWER_LIMIT,
            integral_max: INTEGRAL_UPPER_LIMIT,
            reset_cycles: INTEGRAL_RESET_CYCLES,
            // Hundredths of a volt -> counts: invert the 2.96 cV/count factor.
            scale_num: ADC_CV_DEN,
            scale_den: ADC_CV_NUM,
            feedforward: true,
            output_divisor: OUTPUT_DIVISOR,
            pwm_period: PWM_PERIOD,
        }
    }

    pub fn with_gains(mut self, kp: i32, ki_num: i32, ki_den: i32, kd: i32) -> Self {
        self.kp = kp;
        self.ki_num = ki_num;
        self.ki_den = ki_den;
        self.kd = kd;
        self
    }

    pub fn with_integral_limits(mut self, min: i32, max: i32) -> Self {
        self.integral_min = min;
        self.integral_max = max;
        self
    }

    pub fn with_reset_cycles(mut self, cycles: u32) -> Self {
        self.reset_cycles = cycles;
        self
    }

    /// Identity scaling: setpoint compared directly in ADC counts.
    pub fn with_identity_scale(mut self) -> Self {
        self.scale_num = 1;
        self.scale_den = 1;
        self
    }

    pub fn with_feedforward(mut self, enabled: bool) -> Self {
        self.feedforward = enabled;
        self
    }

    pub fn with_output_divisor(mut self, divisor: i32) -> Self {
        self.output_divisor = divisor;
        self
    }

    pub fn with_pwm_period(mut self, period: u16) -> Self {
        self.pwm_period = period;
        self
    }
}

impl Default for PidConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// PID controller state. Owned exclusively by the control scheduler; only
/// `update()` (one call per control period) mutates it.
pub struct PidController {
    cfg: PidConfig,
    previous_error: i32,
    integral: i32,
    sample_counter: u32,
    last_error: i32,
    last_command: u16,
}

impl PidController {
    pub fn new(cfg: PidConfig) -> Self {
        Self {
            cfg,
            previous_error: 0,
            integral: 0,
            sample_counter: 0,
            last_error: 0,
            last_command: 0,
        }
    }

    /// Seed the previous-error term before the loop starts so the first
    /// derivative sample is not a startup spike.
    pub fn prime(&mut self, setpoint: i32, raw: u16) {
        self.previous_error = self.scale_setpoint(setpoint) - raw as i32;
    }

    #[inline]
    fn scale_setpoint(&self, setpoint: i32) -> i32 {
        setpoint * self.cfg.scale_num / self.cfg.scale_den
    }

    /// One control-period invocation: error -> integral (clamped) ->
    /// derivative -> summed output -> compare-range clamp.
    ///
    /// Never fails: every path through here produces a commandable value,
    /// even under a railed sensor or a saturated integral.
    pub fn update(&mut self, setpoint: i32, raw: u16) -> u16 {
        let error = self.scale_setpoint(setpoint) - raw as i32;
        let cfg = &self.cfg;

        // Integral step matches the period-scaled accumulation of the
        // original law: (e * T / 10_000) * ki, with ki as an exact ratio.
        let step = ((error as i64 * cfg.period_us / 10_000) as i32 * cfg.ki_num) / cfg.ki_den;
        self.integral = (self.integral + step).clamp(cfg.integral_min, cfg.integral_max);

        // Finite difference over one period; no extra filtering.
        let derivative = error - self.previous_error;

        let mut sum = cfg.kp * error + self.integral + cfg.kd * derivative;
        if cfg.feedforward {
            sum += raw as i32;
        }

        // Round to nearest before dividing down to compare counts, then
        // clamp strictly below the PWM period.
        let command = ((sum + cfg.output_divisor / 2) / cfg.output_divisor)
            .clamp(0, cfg.pwm_period as i32 - 1) as u16;

        self.previous_error = error;
        self.last_error = error;
        self.last_command = command;

        self.sample_counter += 1;
        if self.cfg.reset_cycles > 0 && self.sample_counter >= self.cfg.reset_cycles {
            self.integral = 0;
            self.sample_counter = 0;
        }

        command
    }

    /// Diagnostic accessors for the presentation layer. Read-only; the
    /// display never commands the loop.
    #[inline]
    pub fn integral(&self) -> i32 {
        self.integral
    }

    #[inline]
    pub fn last_error(&self) -> i32 {
        self.last_error
    }

    #[inline]
    pub fn last_command(&self) -> u16 {
        self.last_command
    }

    pub fn config(&self) -> &PidConfig {
        &self.cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_never_reaches_period() {
        let mut pid = PidController::new(PidConfig::new());
        // Railed sensor both ways, extreme setpoints.
        for &(sp, raw) in &[(3000, 0u16), (0, 1023u16), (3000, 1023), (0, 0)] {
            for _ in 0..1000 {
                let cmd = pid.update(sp, raw);
                assert!(cmd < pid.config().pwm_period);
            }
        }
    }

    #[test]
    fn integral_step_is_exact() {
        // e=100, T=2048us: (100*2048/10000)=20, *5/2 = 50.
        let cfg = PidConfig::new().with_identity_scale().with_feedforward(false);
        let mut pid = PidController::new(cfg);
        pid.update(100, 0);
        assert_eq!(pid.integral(), 50);
        assert_eq!(pid.last_error(), 100);
    }
}
