//! scheduler.rs
//! Control scheduler: the periodic tick that sequences one PID invocation.
//!
//! `on_timer_tick()` is the handler a timer-overflow event would invoke; it
//! is the only code path that advances the controller state, so it is
//! serialized with itself by construction (one timer, one handler). The
//! `run()` loop plays the role of the hardware timer off-target: it fires the
//! handler at the fixed physical period with a SpinSleeper and reports wake
//! jitter and execution overruns to the metrics.
//!
//! Per-tick sequence:
//! 1. advance both debounce counters,
//! 2. read setpoint and raw reading (atomic snapshots; stale by at most one
//!    period during a race),
//! 3. PID update,
//! 4. write the compare register,
//! 5. trace + metrics.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use log::debug;
use spin_sleep::{SpinSleeper, SpinStrategy};

use crate::regulator::{
    pid::PidController,
    pwm::PwmActuator,
    sampler::FeedbackSampler,
    setpoint::SetpointStore,
};
use crate::utils::metrics::{
    push_capped, push_capped_u64, DeadlineComponent, Event, EventRecorder, SharedMetrics,
};

pub struct ControlScheduler {
    pid: PidController,
    sampler: Arc<FeedbackSampler>,
    setpoint: Arc<SetpointStore>,
    pwm: Arc<PwmActuator>,
    metrics: SharedMetrics,
    recorder: Arc<EventRecorder>,
    period: Duration,
    seq: u64,
}

impl ControlScheduler {
    pub fn new(
        pid: PidController,
        sampler: Arc<FeedbackSampler>,
        setpoint: Arc<SetpointStore>,
        pwm: Arc<PwmActuator>,
        metrics: SharedMetrics,
        recorder: Arc<EventRecorder>,
    ) -> Self {
        let period = Duration::from_micros(pid.config().period_us as u64);
        Self {
            pid,
            sampler,
            setpoint,
            pwm,
            metrics,
            recorder,
            period,
            seq: 1,
        }
    }

    /// Timer-overflow handler: one full control-period invocation. Short and
    /// non-blocking; a harness can call this directly with synthetic cell
    /// contents instead of running the timer loop.
    pub fn on_timer_tick(&mut self) {
        let tick_start = Instant::now();

        self.setpoint.tick();

        let setpoint = self.setpoint.setpoint();
        let raw = self.sampler.raw_reading();
        let command = self.pid.update(setpoint, raw);
        self.pwm.write_compare(command);

        let exec_us = tick_start.elapsed().as_micros() as u64;
        let ts_ns = self.recorder.now_ns();
        self.recorder.record(Event::ControlTick {
            seq: self.seq,
            ts_ns,
            error: self.pid.last_error(),
            integral: self.pid.integral(),
            command,
            exec_us,
        });

        {
            let mut m = match self.metrics.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            m.total_ticks += 1;
            push_capped(&mut m.duty, self.pwm.duty());
            push_capped(&mut m.setpoint_cv, setpoint as f64);
            push_capped(&mut m.raw_counts, raw as f64);
            push_capped_u64(&mut m.exec_us, exec_us);

            // Execution overrun: the handler ran longer than the control
            // period itself, so the next actuation is already late.
            if exec_us > self.period.as_micros() as u64 {
                m.record_deadline_miss(DeadlineComponent::Controller);
            }
        }

        self.seq += 1;
    }

    /// Drive the tick at the fixed physical period until `running` clears.
    /// The period is a design constant baked into the integral scaling;
    /// jitter here is measured, never compensated.
    pub fn run(&mut self, running: Arc<AtomicBool>) {
        let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
        let period_us = self.period.as_micros() as u64;

        // Seed previous-error so the first derivative sample is not a spike.
        self.pid
            .prime(self.setpoint.setpoint(), self.sampler.raw_reading());

        let mut next_deadline = Instant::now() + self.period;
        let mut last_tick = Instant::now();

        while running.load(Ordering::Acquire) {
            let now = Instant::now();
            if now < next_deadline {
                sleeper.sleep(next_deadline - now);
            } else {
                // Late wake: OS scheduling jitter pushed the tick past its
                // release point.
                let mut m = match self.metrics.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                m.record_deadline_miss(DeadlineComponent::Scheduler);
            }

            let actual_tick = Instant::now();
            let actual_period_us = actual_tick.duration_since(last_tick).as_micros() as u64;
            let jitter_us = actual_period_us.abs_diff(period_us);
            last_tick = actual_tick;

            self.on_timer_tick();

            {
                let mut m = match self.metrics.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                push_capped_u64(&mut m.jitter_us, jitter_us);
            }

            next_deadline += self.period;
        }

        debug!("[ControlScheduler] stopped after {} ticks.", self.seq - 1);
    }

    /// Diagnostic view of the controller for the presentation layer.
    pub fn pid(&self) -> &PidController {
        &self.pid
    }

    pub fn ticks(&self) -> u64 {
        self.seq - 1
    }
}
