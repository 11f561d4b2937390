//! Metrics collection and event recording for the regulation loop.
//!
//! Two independent paths:
//! - **EventRecorder:** Lock-free queue (16K capacity) → background CSV export
//!   (nanosecond precision). Producers are the interrupt-style handlers, so
//!   `record()` never blocks and drops silently when full.
//! - **Metrics:** Shared mutex buffer of capped histories for the foreground
//!   display and the run-summary export.

use std::{
    collections::VecDeque,
    fs::File,
    io::{BufWriter, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_queue::ArrayQueue;
use log::error;

/// Loop lifecycle events, one per row in the trace CSV.
#[derive(Debug, Clone)]
pub enum Event {
    /// Sampler latched a completed conversion.
    ConversionComplete {
        seq: u64,
        ts_ns: u64,
        raw: u16,
    },
    /// One control-period invocation finished.
    ControlTick {
        seq: u64,
        ts_ns: u64,
        error: i32,
        integral: i32,
        command: u16,
        exec_us: u64,
    },
    /// A setpoint edge was accepted (debounce window elapsed, in bounds).
    SetpointAccepted {
        ts_ns: u64,
        direction: &'static str,
        setpoint_cv: i32,
    },
    /// A setpoint edge was silently dropped.
    SetpointRejected {
        ts_ns: u64,
        direction: &'static str,
    },
}

impl Event {
    /// Converts event to CSV row format: seq,component,event,ts_ns,field1,field2,field3
    pub fn to_csv_row(&self) -> String {
        match self {
            Event::ConversionComplete { seq, ts_ns, raw } => {
                format!("{},sampler,ConversionComplete,{},{},,", seq, ts_ns, raw)
            }
            Event::ControlTick { seq, ts_ns, error, integral, command, exec_us } => {
                format!(
                    "{},controller,ControlTick,{},e={} i={},cmd={},{}",
                    seq, ts_ns, error, integral, command, exec_us
                )
            }
            Event::SetpointAccepted { ts_ns, direction, setpoint_cv } => {
                format!(",setpoint,SetpointAccepted,{},{},{},", ts_ns, direction, setpoint_cv)
            }
            Event::SetpointRejected { ts_ns, direction } => {
                format!(",setpoint,SetpointRejected,{},{},,", ts_ns, direction)
            }
        }
    }
}

const EVENT_QUEUE_CAPACITY: usize = 16_384;

/// Non-blocking event recorder with background CSV export.
///
/// Timestamps via `now_ns()` (elapsed nanos from recorder creation).
/// `record()` appends to a lock-free queue and returns immediately.
/// `start_exporter()` spawns a thread that drains the queue to a CSV file.
pub struct EventRecorder {
    queue: Arc<ArrayQueue<Event>>,
    run_start: Instant,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(EVENT_QUEUE_CAPACITY)),
            run_start: Instant::now(),
        }
    }

    /// Appends event to queue (lock-free). Silently drops if queue full.
    #[inline]
    pub fn record(&self, event: Event) {
        let _ = self.queue.push(event);
    }

    /// Nanosecond timestamp since recorder creation.
    #[inline]
    pub fn now_ns(&self) -> u64 {
        self.run_start.elapsed().as_nanos() as u64
    }

    /// Spawns background thread draining queue → CSV file.
    /// Exits once `running` clears and the queue has been drained.
    pub fn start_exporter(
        &self,
        output_csv: String,
        label: &str,
        running: Arc<AtomicBool>,
    ) -> thread::JoinHandle<()> {
        let queue = self.queue.clone();
        let label = label.to_string();

        thread::spawn(move || {
            match File::create(&output_csv) {
                Ok(file) => {
                    let mut writer = BufWriter::new(file);
                    let _ = writeln!(writer, "# run={}", label);
                    let _ = writeln!(writer, "seq,component,event,ts_ns,field1,field2,field3");

                    loop {
                        match queue.pop() {
                            Some(event) => {
                                let _ = writeln!(writer, "{}", event.to_csv_row());
                            }
                            None => {
                                if !running.load(Ordering::Acquire) && queue.is_empty() {
                                    break;
                                }
                                thread::sleep(Duration::from_millis(10));
                            }
                        }
                    }

                    let _ = writer.flush();
                }
                Err(e) => {
                    error!("Failed to create event CSV: {}", e);
                }
            }
        })
    }
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventRecorder {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            run_start: self.run_start,
        }
    }
}

/// Live loop metrics: output voltage, duty, setpoint and timing histories,
/// bounded to the 1000 most recent points per series.
#[derive(Default, Clone)]
pub struct Metrics {
    /// Plant output voltage samples (volts).
    pub vout_v: VecDeque<f64>,
    /// Commanded duty cycle (fraction of the PWM period).
    pub duty: VecDeque<f64>,
    /// Setpoint history (hundredths of a volt).
    pub setpoint_cv: VecDeque<f64>,
    /// Raw ADC readings seen by the control tick.
    pub raw_counts: VecDeque<f64>,

    /// Timing (microseconds).
    pub jitter_us: VecDeque<u64>,
    pub exec_us: VecDeque<u64>,

    /// Deadline miss counters per component.
    pub miss_scheduler: u64,
    pub miss_controller: u64,

    /// Total deadline misses across components.
    pub deadline_miss: u64,

    pub total_ticks: u64,
    pub setpoint_changes: u64,
}

/// Component identifier for deadline miss attribution.
pub enum DeadlineComponent {
    /// Timer wake slipped past its release point.
    Scheduler,
    /// Tick execution ran longer than the control period.
    Controller,
}

impl Metrics {
    /// Records deadline miss for specified component; updates total count.
    pub fn record_deadline_miss(&mut self, component: DeadlineComponent) {
        match component {
            DeadlineComponent::Scheduler => self.miss_scheduler += 1,
            DeadlineComponent::Controller => self.miss_controller += 1,
        }
        self.deadline_miss += 1;
    }
}

pub type SharedMetrics = Arc<Mutex<Metrics>>;

pub const MAX_POINTS: usize = 1_000;

/// Appends value to metrics buffer; removes oldest if at capacity (FIFO).
#[inline]
pub fn push_capped(buf: &mut VecDeque<f64>, val: f64) {
    if buf.len() >= MAX_POINTS {
        buf.pop_front();
    }
    buf.push_back(val);
}

/// Appends u64 value to metrics buffer; removes oldest if at capacity.
#[inline]
pub fn push_capped_u64(buf: &mut VecDeque<u64>, val: u64) {
    if buf.len() >= MAX_POINTS {
        buf.pop_front();
    }
    buf.push_back(val);
}

/// Statistics summary for a dataset.
#[derive(Debug, Clone)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
}

/// Computes min, max, mean for float buffer.
pub fn calculate_stats(data: &VecDeque<f64>) -> Option<Stats> {
    if data.is_empty() {
        return None;
    }

    let count = data.len();
    let min = data.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mean = data.iter().sum::<f64>() / count as f64;

    Some(Stats { min, max, mean, count })
}

/// Computes min, max, mean for u64 buffer (cast to f64).
pub fn calculate_stats_u64(data: &VecDeque<u64>) -> Option<Stats> {
    if data.is_empty() {
        return None;
    }

    let count = data.len();
    let min = data.iter().map(|&x| x as f64).fold(f64::INFINITY, f64::min);
    let max = data.iter().map(|&x| x as f64).fold(f64::NEG_INFINITY, f64::max);
    let mean = data.iter().map(|&x| x as f64).sum::<f64>() / count as f64;

    Some(Stats { min, max, mean, count })
}
