//! # Flyback Regulator Simulation Entry Point
//!
//! Runs the interrupt-style control engine against a simulated converter.
//! Threads stand in for the hardware event sources:
//! - **ADC thread:** free-running conversions every 104 µs; advances the
//!   plant, then fires the conversion-complete handler.
//! - **Control thread:** timer overflow at T = 2048 µs (SpinSleeper, max
//!   priority, pinned); the only writer of controller state.
//! - **Button thread:** edge events (with contact bounce) through a bounded
//!   channel into the debounced setpoint handlers.
//! - **Foreground loop:** reads the read-only accessors every 200 ms and
//!   logs ADC voltage / setpoint / duty, the way the firmware's display
//!   loop formatted its LCD.
//!
//! ## Outputs
//! - `data/logs/trace_<mode>.csv` — per-event trace (nanosecond precision).
//! - `data/results/summary_<mode>.csv`, `history_<mode>.csv` — run stats.

use flyback_regulator::{
    config::{ADC_CONVERSION_US, ADC_CV_DEN, ADC_CV_NUM, INITIAL_SETPOINT_CV},
    plant::{adc::SimAdc, converter::FlybackModel},
    regulator::{
        pid::{PidConfig, PidController},
        pwm::PwmActuator,
        sampler::FeedbackSampler,
        scheduler::ControlScheduler,
        setpoint::SetpointStore,
    },
    utils::{
        export::run_exports,
        metrics::{push_capped, Event, EventRecorder, Metrics, SharedMetrics},
    },
};

use crossbeam::channel::{bounded, Receiver, Sender};
use log::{error, info};
use rand::random_range;
use spin_sleep::{SpinSleeper, SpinStrategy};
use std::{
    fs::create_dir_all,
    io::{stdin, stdout, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};
use thread_priority::{ThreadBuilderExt, ThreadPriority};

const DEFAULT_RUN_SECS: u64 = 10;
const DISPLAY_PERIOD_MS: u64 = 200;
const CONTROL_CORE: usize = 0;

/// Edge polarity of the two setpoint inputs.
#[derive(Debug, Clone, Copy)]
enum ButtonEdge {
    Up,
    Down,
}

fn main() {
    env_logger::init();
    info!("=== FLYBACK REGULATOR SIMULATION START ===");

    loop {
        let choice = prompt_menu();
        match choice.as_str() {
            "1" | "" => {
                let secs = prompt_duration();
                run_simulation("disturbed", secs, ButtonScenario::RandomBursts);
                println!("\n Run completed. Returning to menu...\n");
            }
            "2" => {
                run_simulation("step", 8, ButtonScenario::StepUp);
                println!("\n Step response completed. Returning to menu...\n");
            }
            "3" => {
                println!("Exiting. Goodbye!");
                info!("=== FLYBACK REGULATOR SIMULATION FINISHED ===");
                return;
            }
            other => {
                println!("Unrecognized option '{}', please try again.", other);
            }
        }
    }
}

fn prompt_menu() -> String {
    println!("\n┌─────────────────────────────────────────────┐");
    println!("│     SELECT SIMULATION MODE                  │");
    println!("├─────────────────────────────────────────────┤");
    println!("│  1) Closed loop with disturbances           │");
    println!("│  2) Setpoint step response                  │");
    println!("│  3) Exit                                    │");
    println!("└─────────────────────────────────────────────┘");
    print!("Select [1/2/3] (default: 1): ");
    let _ = stdout().flush();

    let mut input = String::new();
    let _ = stdin().read_line(&mut input);
    input.trim().to_string()
}

fn prompt_duration() -> u64 {
    print!("Run duration in seconds [default: {}]: ", DEFAULT_RUN_SECS);
    let _ = stdout().flush();
    let mut input = String::new();
    let _ = stdin().read_line(&mut input);
    input.trim().parse::<u64>().unwrap_or(DEFAULT_RUN_SECS)
}

/// How the button thread exercises the setpoint inputs.
enum ButtonScenario {
    /// Random up/down bursts with contact bounce, every couple of seconds.
    RandomBursts,
    /// A sequence of up presses early in the run (step-response stimulus).
    StepUp,
}

fn run_simulation(label: &str, duration_secs: u64, scenario: ButtonScenario) {
    info!("[Run] Starting '{}' for {} s", label, duration_secs);

    let metrics: SharedMetrics = Arc::new(Mutex::new(Metrics::default()));
    let recorder = Arc::new(EventRecorder::new());

    if let Err(e) = create_dir_all("data/logs") {
        error!("Failed to create data/logs: {}", e);
        return;
    }
    let trace_path = format!("data/logs/trace_{}.csv", label);
    let running = Arc::new(AtomicBool::new(true));
    let exporter_handle = recorder.start_exporter(trace_path.clone(), label, running.clone());

    // Shared cells and their owners.
    let plant = Arc::new(parking_lot::Mutex::new(FlybackModel::new()));
    let sampler = Arc::new(FeedbackSampler::new());
    let setpoint = Arc::new(SetpointStore::new(INITIAL_SETPOINT_CV));
    let pwm = Arc::new(PwmActuator::new());

    // ========================================================================
    // ADC thread: free-running conversion-complete events
    // ========================================================================
    let adc_handle = {
        let plant_a = plant.clone();
        let sampler_a = sampler.clone();
        let pwm_a = pwm.clone();
        let running_a = running.clone();
        let recorder_a = recorder.clone();
        let metrics_a = metrics.clone();

        thread::spawn(move || {
            let mut adc = SimAdc::new(plant_a.clone());
            let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
            let conversion = Duration::from_micros(ADC_CONVERSION_US);
            let dt_s = ADC_CONVERSION_US as f64 / 1e6;
            let mut seq: u64 = 1;

            while running_a.load(Ordering::Acquire) {
                // Conversion window; the plant keeps moving under the
                // currently latched duty cycle.
                sleeper.sleep(conversion);
                {
                    let mut p = plant_a.lock();
                    p.step(pwm_a.duty(), dt_s);
                }

                sampler_a.on_conversion_complete(&mut adc);

                let ts_ns = recorder_a.now_ns();
                recorder_a.record(Event::ConversionComplete {
                    seq,
                    ts_ns,
                    raw: sampler_a.raw_reading(),
                });

                // Keep an output-voltage history for the summary export.
                if seq % 16 == 0 {
                    let vout = plant_a.lock().vout();
                    let mut m = match metrics_a.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    push_capped(&mut m.vout_v, vout);
                }

                seq += 1;
            }
        })
    };

    // ========================================================================
    // Control thread: the periodic timer, max priority, pinned
    // ========================================================================
    let control_handle = {
        let sampler_c = sampler.clone();
        let setpoint_c = setpoint.clone();
        let pwm_c = pwm.clone();
        let metrics_c = metrics.clone();
        let recorder_c = recorder.clone();
        let running_c = running.clone();

        thread::Builder::new()
            .name("control-tick".to_string())
            .spawn_with_priority(ThreadPriority::Max, move |_| {
                let core_ids = core_affinity::get_core_ids().unwrap_or_default();
                if let Some(core_id) = core_ids.get(CONTROL_CORE) {
                    if core_affinity::set_for_current(*core_id) {
                        info!("Control thread pinned to core {}", CONTROL_CORE);
                    } else {
                        error!("Failed to pin control thread to core {}", CONTROL_CORE);
                    }
                }

                let mut scheduler = ControlScheduler::new(
                    PidController::new(PidConfig::new()),
                    sampler_c,
                    setpoint_c,
                    pwm_c,
                    metrics_c,
                    recorder_c,
                );
                scheduler.run(running_c);
            })
            .expect("Failed to spawn control thread")
    };

    // ========================================================================
    // Button edges: scenario generator -> bounded channel -> edge dispatch
    // ========================================================================
    let (tx_edges, rx_edges) = bounded::<ButtonEdge>(64);
    let scenario_handle = spawn_scenario(scenario, tx_edges, running.clone());
    let dispatch_handle = spawn_edge_dispatch(
        rx_edges,
        setpoint.clone(),
        recorder.clone(),
        metrics.clone(),
    );

    // ========================================================================
    // Foreground display loop (presentation boundary: read-only accessors)
    // ========================================================================
    let display_ticks = duration_secs * 1000 / DISPLAY_PERIOD_MS;
    for _ in 0..display_ticks {
        thread::sleep(Duration::from_millis(DISPLAY_PERIOD_MS));

        let raw = sampler.raw_reading();
        let adc_cv = raw as i32 * ADC_CV_NUM / ADC_CV_DEN;
        let set_cv = setpoint.setpoint();
        let (vin_v, load_ohms) = {
            let p = plant.lock();
            (p.vin(), p.load_ohms())
        };
        info!(
            "ADC {:>2}.{:02}V  SET {:>2}.{:02}V  duty {:>5.1}%  compare {:>3}/{}  vin {:>4.1}V  load {:>5.1}Ω",
            adc_cv / 100,
            adc_cv % 100,
            set_cv / 100,
            set_cv % 100,
            pwm.duty() * 100.0,
            pwm.compare(),
            pwm.period(),
            vin_v,
            load_ohms,
        );
    }

    info!("[Run] Time's up, shutting down...");
    running.store(false, Ordering::Release);

    let _ = adc_handle.join();
    let _ = control_handle.join();
    let _ = scenario_handle.join();
    let _ = dispatch_handle.join();
    let _ = exporter_handle.join();

    run_exports(&metrics, label);
    info!("[Run] Completed '{}'; trace at {}", label, trace_path);
}

/// Generates button edges for the selected scenario. A "press" is a burst of
/// edges 1 ms apart, the bounce pattern the debounce window exists to coalesce.
fn spawn_scenario(
    scenario: ButtonScenario,
    tx: Sender<ButtonEdge>,
    running: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let send_burst = |edge: ButtonEdge| {
            for _ in 0..5 {
                if tx.try_send(edge).is_err() {
                    break;
                }
                thread::sleep(Duration::from_millis(1));
            }
        };

        match scenario {
            ButtonScenario::RandomBursts => {
                while running.load(Ordering::Acquire) {
                    // Sleep in short slices so shutdown is not held up.
                    let pause_ms: u64 = random_range(1500..3000);
                    let mut slept: u64 = 0;
                    while slept < pause_ms && running.load(Ordering::Acquire) {
                        thread::sleep(Duration::from_millis(100));
                        slept += 100;
                    }
                    if !running.load(Ordering::Acquire) {
                        break;
                    }
                    if random_range(0.0..1.0) < 0.7 {
                        send_burst(ButtonEdge::Up);
                    } else {
                        send_burst(ButtonEdge::Down);
                    }
                }
            }
            ButtonScenario::StepUp => {
                // Let the loop settle at the initial setpoint first.
                thread::sleep(Duration::from_secs(1));
                for _ in 0..8 {
                    if !running.load(Ordering::Acquire) {
                        break;
                    }
                    send_burst(ButtonEdge::Up);
                    thread::sleep(Duration::from_millis(300));
                }
            }
        }
    })
}

/// Delivers each edge to its handler, recording accept/reject for the trace.
fn spawn_edge_dispatch(
    rx: Receiver<ButtonEdge>,
    setpoint: Arc<SetpointStore>,
    recorder: Arc<EventRecorder>,
    metrics: SharedMetrics,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while let Ok(edge) = rx.recv() {
            let (accepted, direction) = match edge {
                ButtonEdge::Up => (setpoint.increase(), "up"),
                ButtonEdge::Down => (setpoint.decrease(), "down"),
            };

            let ts_ns = recorder.now_ns();
            if accepted {
                recorder.record(Event::SetpointAccepted {
                    ts_ns,
                    direction,
                    setpoint_cv: setpoint.setpoint(),
                });
                let mut m = match metrics.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                m.setpoint_changes += 1;
            } else {
                recorder.record(Event::SetpointRejected { ts_ns, direction });
            }
        }
    })
}
