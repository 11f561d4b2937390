//! # Flyback Converter Voltage Regulator
//!
//! Closed-loop regulation of a flyback DC-DC converter's output voltage:
//! a free-running feedback sampler, a debounced setpoint store, a
//! fixed-point PID law with anti-windup, and a PWM compare register, all
//! sequenced by a strictly periodic control tick (T = 2048 µs).
//!
//! ## Shared-state discipline
//! Every shared cell (raw reading, setpoint, compare register, debounce
//! counters) is a single atomically-observable word with one writer, so the
//! event handlers never need a critical section; readers tolerate a value
//! that is at most one period stale.
//!
//! ## Off-target execution
//! The handlers are plain functions over explicitly owned cells. The binary
//! drives them from threads standing in for the hardware event sources
//! (conversion complete, timer overflow, button edges) against a simulated
//! converter; the test harness drives them directly with synthetic inputs.

pub mod config;
pub mod plant;
pub mod regulator;
pub mod utils;
