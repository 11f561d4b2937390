//! sampler.rs
//! Free-running feedback sampler.
//!
//! The conversion-complete handler latches each finished sample into a shared
//! raw-reading cell and immediately re-arms the next conversion, so sampling
//! runs asynchronously and indefinitely relative to the control period. The
//! cell is a single `AtomicU16`: one writer (this handler), one reader (the
//! control tick), no critical section needed. A skipped conversion is not an
//! error; the sampler simply resumes on the next completion event.

use std::sync::atomic::{AtomicU16, Ordering};

use crate::config::ADC_MAX;

/// The converter side of the sampler: exposes the completed result as the
/// low/high register pair the hardware presents, and a re-arm operation.
/// The simulated ADC implements this; a test harness can hand the handler a
/// canned result.
pub trait ConversionSource {
    /// Completed conversion result as (low byte, high byte).
    fn result(&self) -> (u8, u8);

    /// Request the next conversion.
    fn start(&mut self);
}

/// Shared raw-reading cell plus the conversion-complete handler.
pub struct FeedbackSampler {
    raw: AtomicU16,
}

impl FeedbackSampler {
    pub fn new() -> Self {
        Self { raw: AtomicU16::new(0) }
    }

    /// Conversion-complete handler: combine the result bytes, store the
    /// reading, re-arm. No return value; the effect is entirely the cell.
    pub fn on_conversion_complete<S: ConversionSource>(&self, adc: &mut S) {
        let (lo, hi) = adc.result();
        let sample = (((hi as u16) << 8) | lo as u16) & ADC_MAX;
        self.raw.store(sample, Ordering::Release);
        adc.start();
    }

    /// Latest latched reading; the control tick reads whatever is present at
    /// its firing instant (bounded sensor latency, not a hazard).
    #[inline]
    pub fn raw_reading(&self) -> u16 {
        self.raw.load(Ordering::Acquire)
    }
}

impl Default for FeedbackSampler {
    fn default() -> Self {
        Self::new()
    }
}
