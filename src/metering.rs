//! DSP-load telemetry (spec §4.7). Kept close to
//! `tutti-core::metering::cpu::CpuMeter`: an exponential moving average of
//! per-callback elapsed time against the sample-rate-derived budget.

use std::time::Duration;

use crate::compat::{AtomicU64, Ordering};
use crate::lockfree::AtomicDouble;

const EMA_ALPHA: f64 = 0.1;

#[derive(Debug, Clone, Copy, Default)]
pub struct CpuMetrics {
    pub current_pct: f64,
    pub average_pct: f64,
    pub peak_pct: f64,
    pub underruns: u64,
}

/// Tracks CPU load of the audio callback as a fraction of its time budget.
///
/// `record`/`reset` run on the audio thread; `metrics`/`load_band` are
/// polled from the UI thread (the host's CPU-meter display, the job-queue
/// retuning in [`crate::engine::AudioEngine::render`]) while the audio
/// thread keeps writing, so every published field — including
/// `underruns` — is an atomic rather than a plain scalar.
#[derive(Debug)]
pub struct CpuMeter {
    sample_rate: f64,
    average_pct: AtomicDouble,
    peak_pct: AtomicDouble,
    current_pct: AtomicDouble,
    underruns: AtomicU64,
}

impl Clone for CpuMeter {
    fn clone(&self) -> Self {
        Self {
            sample_rate: self.sample_rate,
            average_pct: self.average_pct.clone(),
            peak_pct: self.peak_pct.clone(),
            current_pct: self.current_pct.clone(),
            underruns: AtomicU64::new(self.underruns.load(Ordering::Relaxed)),
        }
    }
}

impl CpuMeter {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            average_pct: AtomicDouble::new(0.0),
            peak_pct: AtomicDouble::new(0.0),
            current_pct: AtomicDouble::new(0.0),
            underruns: AtomicU64::new(0),
        }
    }

    /// `budget = buffer_size * 1e6 / sample_rate` microseconds.
    pub fn budget_us(&self, buffer_size: usize) -> f64 {
        buffer_size as f64 * 1_000_000.0 / self.sample_rate
    }

    /// Record one callback's elapsed wall-clock time against its budget.
    pub fn record(&mut self, buffer_size: usize, elapsed: Duration) {
        let budget = self.budget_us(buffer_size).max(1e-9);
        let elapsed_us = elapsed.as_secs_f64() * 1_000_000.0;
        let pct = (elapsed_us / budget) * 100.0;

        self.current_pct.set(pct);
        let average = self.average_pct.get() * (1.0 - EMA_ALPHA) + pct * EMA_ALPHA;
        self.average_pct.set(average);
        if pct > self.peak_pct.get() {
            self.peak_pct.set(pct);
        }
        if elapsed_us > budget {
            self.underruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn metrics(&self) -> CpuMetrics {
        CpuMetrics {
            current_pct: self.current_pct.get(),
            average_pct: self.average_pct.get(),
            peak_pct: self.peak_pct.get(),
            underruns: self.underruns.load(Ordering::Relaxed),
        }
    }

    /// Load band used to pick a [`crate::plugin::JobQueue`] sleep hint
    /// (spec §4.7 telemetry: idle / ≥30% / ≥50%).
    pub fn load_band(&self) -> LoadBand {
        let average_pct = self.average_pct.get();
        if average_pct >= 50.0 {
            LoadBand::High
        } else if average_pct >= 30.0 {
            LoadBand::Moderate
        } else {
            LoadBand::Idle
        }
    }

    pub fn reset(&mut self) {
        self.average_pct.set(0.0);
        self.peak_pct.set(0.0);
        self.current_pct.set(0.0);
        self.underruns.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBand {
    Idle,
    Moderate,
    High,
}

impl LoadBand {
    /// Worker idle-sleep hint in nanoseconds for this band, matching the
    /// 10µs/50µs/200µs bands of `tutti-core`'s job-worker sleep tuning.
    pub fn sleep_ns(self) -> u64 {
        match self {
            LoadBand::High => 10_000,
            LoadBand::Moderate => 50_000,
            LoadBand::Idle => 200_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_tracks_average_and_peak() {
        let mut meter = CpuMeter::new(48000.0);
        meter.record(128, Duration::from_micros(100));
        let m = meter.metrics();
        assert!(m.current_pct > 0.0);
        assert!(m.peak_pct >= m.current_pct);
    }

    #[test]
    fn overrun_increments_underruns() {
        let mut meter = CpuMeter::new(48000.0);
        let budget_us = meter.budget_us(128);
        meter.record(128, Duration::from_micros((budget_us * 2.0) as u64));
        assert_eq!(meter.metrics().underruns, 1);
    }

    #[test]
    fn load_band_thresholds() {
        let mut meter = CpuMeter::new(48000.0);
        assert_eq!(meter.load_band(), LoadBand::Idle);
        for _ in 0..50 {
            meter.record(128, Duration::from_micros(2000));
        }
        assert_eq!(meter.load_band(), LoadBand::High);
    }
}
