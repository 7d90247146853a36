//! Peak metering with atomic publication
//!
//! Meters are display-only: the audio thread updates them every block, the UI
//! polls the published dB value through a shared handle. They never touch the
//! signal path.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared cell holding the published meter value in dB
#[derive(Debug, Default)]
pub struct MeterCell {
    bits: AtomicU64,
}

impl MeterCell {
    /// Read the published level in dB (UI thread, lock-free)
    #[inline]
    pub fn db(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    #[inline]
    fn publish(&self, db: f64) {
        self.bits.store(db.to_bits(), Ordering::Relaxed);
    }
}

/// Peak meter with exponential decay
#[derive(Debug)]
pub struct PeakMeter {
    current_peak: f64,
    decay: f64,
    cell: Arc<MeterCell>,
}

impl PeakMeter {
    pub fn new(sample_rate: f64, decay_ms: f64) -> Self {
        let decay_samples = (decay_ms.max(1.0) / 1000.0) * sample_rate;
        let mut meter = Self {
            current_peak: 0.0,
            decay: (-1.0 / decay_samples.max(1.0)).exp(),
            cell: Arc::new(MeterCell::default()),
        };
        meter.cell.publish(f64::NEG_INFINITY);
        meter
    }

    /// Handle for the UI side
    pub fn handle(&self) -> Arc<MeterCell> {
        Arc::clone(&self.cell)
    }

    /// Fold a block of f64 samples into the meter and publish
    pub fn process_f64(&mut self, samples: &[f64]) {
        for &s in samples {
            let level = s.abs();
            if level > self.current_peak {
                self.current_peak = level;
            } else {
                self.current_peak *= self.decay;
            }
        }
        self.publish();
    }

    /// Fold an interleaved pair of channel blocks into the meter
    pub fn process_stereo_f64(&mut self, left: &[f64], right: &[f64]) {
        for (&l, &r) in left.iter().zip(right.iter()) {
            let level = l.abs().max(r.abs());
            if level > self.current_peak {
                self.current_peak = level;
            } else {
                self.current_peak *= self.decay;
            }
        }
        self.publish();
    }

    fn publish(&self) {
        let db = if self.current_peak > 1e-10 {
            20.0 * self.current_peak.log10()
        } else {
            f64::NEG_INFINITY
        };
        self.cell.publish(db);
    }

    pub fn reset(&mut self) {
        self.current_peak = 0.0;
        self.cell.publish(f64::NEG_INFINITY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_tracks_level() {
        let mut meter = PeakMeter::new(48000.0, 300.0);
        let block: Vec<f64> = vec![0.5; 512];
        meter.process_f64(&block);
        let db = meter.handle().db();
        assert!((db - -6.02).abs() < 0.2, "db {}", db);
    }

    #[test]
    fn test_decay_after_silence() {
        let mut meter = PeakMeter::new(48000.0, 50.0);
        meter.process_f64(&vec![1.0; 64]);
        let loud = meter.handle().db();
        meter.process_f64(&vec![0.0; 48000]);
        let quiet = meter.handle().db();
        assert!(quiet < loud - 40.0);
    }

    #[test]
    fn test_handle_shares_state() {
        let mut meter = PeakMeter::new(48000.0, 300.0);
        let handle = meter.handle();
        assert_eq!(handle.db(), f64::NEG_INFINITY);
        meter.process_f64(&vec![1.0; 16]);
        assert!(handle.db() > -1.0);
    }
}
