//! Run-summary and history export for offline analysis.
//!
//! Two outputs per run:
//! - `summary_<label>.csv` — aggregated stats (min/max/avg) for voltage,
//!   duty, timing, plus deadline-miss and tick counters.
//! - `history_<label>.csv` — the capped per-tick histories (vout, duty,
//!   setpoint, raw counts) as aligned rows for plotting.

use std::{fs::create_dir_all, path::Path};

use csv::Writer;
use log::{error, info};
use serde::Serialize;

use crate::utils::metrics::{calculate_stats, calculate_stats_u64, SharedMetrics, Stats};

const EXPORT_DIR: &str = "data/results";

#[derive(Debug, Serialize)]
struct SummaryRow {
    metric: String,
    value: f64,
    description: String,
}

#[derive(Debug, Serialize)]
struct HistoryRow {
    index: usize,
    vout_v: f64,
    duty: f64,
    setpoint_cv: f64,
    raw_counts: f64,
}

fn push_stat_rows(rows: &mut Vec<SummaryRow>, name: &str, unit: &str, stats: Option<Stats>) {
    if let Some(s) = stats {
        rows.push(SummaryRow {
            metric: format!("{}_min", name),
            value: s.min,
            description: format!("Minimum {} ({})", name, unit),
        });
        rows.push(SummaryRow {
            metric: format!("{}_max", name),
            value: s.max,
            description: format!("Maximum {} ({})", name, unit),
        });
        rows.push(SummaryRow {
            metric: format!("{}_avg", name),
            value: s.mean,
            description: format!("Average {} ({})", name, unit),
        });
    }
}

/// Exports summary stats and tick histories for one run.
pub fn run_exports(metrics: &SharedMetrics, label: &str) {
    let export_dir = Path::new(EXPORT_DIR);
    if let Err(e) = create_dir_all(export_dir) {
        error!("Failed to create export directory: {}", e);
        return;
    }

    let m = match metrics.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    let mut rows = Vec::new();
    rows.push(SummaryRow {
        metric: "total_ticks".into(),
        value: m.total_ticks as f64,
        description: "Control-period invocations".into(),
    });
    rows.push(SummaryRow {
        metric: "setpoint_changes".into(),
        value: m.setpoint_changes as f64,
        description: "Accepted setpoint adjustments".into(),
    });
    rows.push(SummaryRow {
        metric: "deadline_misses".into(),
        value: m.deadline_miss as f64,
        description: "Total deadline miss events".into(),
    });
    rows.push(SummaryRow {
        metric: "miss_scheduler".into(),
        value: m.miss_scheduler as f64,
        description: "Late timer wakes".into(),
    });
    rows.push(SummaryRow {
        metric: "miss_controller".into(),
        value: m.miss_controller as f64,
        description: "Tick executions longer than the control period".into(),
    });

    push_stat_rows(&mut rows, "vout", "V", calculate_stats(&m.vout_v));
    push_stat_rows(&mut rows, "duty", "fraction", calculate_stats(&m.duty));
    push_stat_rows(&mut rows, "setpoint", "cV", calculate_stats(&m.setpoint_cv));
    push_stat_rows(&mut rows, "raw", "counts", calculate_stats(&m.raw_counts));
    push_stat_rows(&mut rows, "jitter", "us", calculate_stats_u64(&m.jitter_us));
    push_stat_rows(&mut rows, "exec", "us", calculate_stats_u64(&m.exec_us));

    let summary_path = export_dir.join(format!("summary_{}.csv", label));
    match Writer::from_path(&summary_path) {
        Ok(mut writer) => {
            for row in &rows {
                if let Err(e) = writer.serialize(row) {
                    error!("Failed to write summary row: {}", e);
                    break;
                }
            }
            if let Err(e) = writer.flush() {
                error!("Failed to flush summary CSV: {}", e);
            } else {
                info!("Summary exported to {:?}", summary_path);
            }
        }
        Err(e) => error!("Failed to create summary CSV: {}", e),
    }

    // History rows: series lengths differ when the run outlasts the cap;
    // absent points become 0.0 like the consolidated exports upstream.
    let max_len = m
        .vout_v
        .len()
        .max(m.duty.len())
        .max(m.setpoint_cv.len())
        .max(m.raw_counts.len());

    let history_path = export_dir.join(format!("history_{}.csv", label));
    match Writer::from_path(&history_path) {
        Ok(mut writer) => {
            for i in 0..max_len {
                let row = HistoryRow {
                    index: i,
                    vout_v: m.vout_v.get(i).copied().unwrap_or(0.0),
                    duty: m.duty.get(i).copied().unwrap_or(0.0),
                    setpoint_cv: m.setpoint_cv.get(i).copied().unwrap_or(0.0),
                    raw_counts: m.raw_counts.get(i).copied().unwrap_or(0.0),
                };
                if let Err(e) = writer.serialize(&row) {
                    error!("Failed to write history row: {}", e);
                    break;
                }
            }
            if let Err(e) = writer.flush() {
                error!("Failed to flush history CSV: {}", e);
            } else {
                info!("History ({} rows) exported to {:?}", max_len, history_path);
            }
        }
        Err(e) => error!("Failed to create history CSV: {}", e),
    }
}
