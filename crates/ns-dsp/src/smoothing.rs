//! Lock-free parameter smoothing
//!
//! Click-free parameter changes: the UI thread stores a target atomically, the
//! audio thread ramps toward it per sample with pre-computed coefficients.
//! Zero allocation on the audio thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Smoothing algorithm type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmoothingType {
    /// Exponential decay (RC filter style)
    #[default]
    Exponential,
    /// Linear ramp over a fixed sample count; per-sample slope is bounded by
    /// `|target - current| / ramp_samples` at retarget time
    Linear,
    /// No smoothing (instant change)
    None,
}

/// Lock-free smoothed parameter for audio processing
#[derive(Debug)]
pub struct SmoothedParam {
    /// Target value (set from UI thread)
    target: AtomicU64,
    /// Current smoothed value (audio thread only)
    current: f64,
    /// Exponential smoothing coefficient
    coeff: f64,
    smoothing_type: SmoothingType,
    /// Smoothing time in samples
    smoothing_samples: f64,
    /// Step size for linear smoothing
    linear_step: f64,
    /// Remaining samples for linear smoothing
    linear_remaining: i32,
    /// Flag indicating the target has changed
    dirty: AtomicBool,
    sample_rate: f64,
}

impl SmoothedParam {
    pub fn new(
        initial_value: f64,
        smoothing_time_ms: f64,
        sample_rate: f64,
        smoothing_type: SmoothingType,
    ) -> Self {
        let smoothing_samples = (smoothing_time_ms / 1000.0) * sample_rate;
        Self {
            target: AtomicU64::new(initial_value.to_bits()),
            current: initial_value,
            coeff: Self::calculate_coeff(smoothing_samples),
            smoothing_type,
            smoothing_samples,
            linear_step: 0.0,
            linear_remaining: 0,
            dirty: AtomicBool::new(false),
            sample_rate,
        }
    }

    /// Exponential coefficient reaching ~63% of the step in `samples`
    fn calculate_coeff(samples: f64) -> f64 {
        if samples <= 0.0 {
            1.0
        } else {
            1.0 - (-1.0 / samples).exp()
        }
    }

    pub fn set_smoothing_time(&mut self, time_ms: f64) {
        self.smoothing_samples = (time_ms / 1000.0) * self.sample_rate;
        self.coeff = Self::calculate_coeff(self.smoothing_samples);
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        let time_ms = (self.smoothing_samples / self.sample_rate) * 1000.0;
        self.sample_rate = sample_rate;
        self.set_smoothing_time(time_ms);
    }

    /// Set target value (thread-safe, callable from the UI thread)
    #[inline]
    pub fn set_target(&self, value: f64) {
        self.target.store(value.to_bits(), Ordering::Relaxed);
        self.dirty.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn target(&self) -> f64 {
        f64::from_bits(self.target.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Maximum per-sample slope of the active linear ramp (0 when settled)
    pub fn max_step(&self) -> f64 {
        if self.linear_remaining > 0 {
            self.linear_step.abs()
        } else {
            0.0
        }
    }

    /// Jump to a value immediately (initialization / preset restore)
    pub fn set_immediate(&mut self, value: f64) {
        self.current = value;
        self.target.store(value.to_bits(), Ordering::Relaxed);
        self.linear_remaining = 0;
        self.dirty.store(false, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_smoothing(&self) -> bool {
        match self.smoothing_type {
            SmoothingType::None => false,
            SmoothingType::Linear => self.linear_remaining > 0,
            SmoothingType::Exponential => (self.current - self.target()).abs() > 1e-10,
        }
    }

    /// Advance one sample and return the smoothed value
    #[inline]
    pub fn next(&mut self) -> f64 {
        let target = self.target();

        match self.smoothing_type {
            SmoothingType::None => {
                self.current = target;
            }
            SmoothingType::Exponential => {
                self.current += self.coeff * (target - self.current);
            }
            SmoothingType::Linear => {
                if self.dirty.swap(false, Ordering::Relaxed) {
                    let diff = target - self.current;
                    self.linear_remaining = self.smoothing_samples as i32;
                    if self.linear_remaining > 0 {
                        self.linear_step = diff / self.linear_remaining as f64;
                    } else {
                        self.current = target;
                        self.linear_step = 0.0;
                    }
                }

                if self.linear_remaining > 0 {
                    self.current += self.linear_step;
                    self.linear_remaining -= 1;
                } else {
                    self.current = target;
                }
            }
        }

        self.current
    }

    /// Snap to the current target instantly
    pub fn reset(&mut self) {
        self.current = self.target();
        self.linear_remaining = 0;
        self.dirty.store(false, Ordering::Relaxed);
    }
}
