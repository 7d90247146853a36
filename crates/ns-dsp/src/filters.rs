//! Filter building blocks
//!
//! Includes:
//! - Biquad (Transposed Direct Form II) with RBJ lowpass/highpass coefficients
//! - State-variable filter (TPT integrator core), modulation-safe
//! - Ladder filter (four cascaded one-pole stages with saturating feedback)
//!
//! Filter state is kept in `f64`; inputs and outputs are `Sample` (f32).

use ns_core::{Sample, flush_denormal};
use std::f64::consts::PI;

use crate::{MonoProcessor, Processor, ProcessorConfig};

/// Lowest permitted cutoff for any filter in the core
pub const MIN_CUTOFF_HZ: f64 = 10.0;

/// Clamp a cutoff into the stable range for the given sample rate
#[inline]
pub fn clamp_cutoff(freq: f64, sample_rate: f64) -> f64 {
    if freq.is_finite() {
        freq.clamp(MIN_CUTOFF_HZ, sample_rate * 0.49)
    } else {
        1000.0
    }
}

// ============ Biquad ============

/// Biquad coefficients (normalized, a0 = 1)
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    /// RBJ lowpass coefficients
    pub fn lowpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        let freq = clamp_cutoff(freq, sample_rate);
        let q = q.max(0.05);
        let omega = 2.0 * PI * freq / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);

        let b0 = (1.0 - cos_omega) / 2.0;
        let b1 = 1.0 - cos_omega;
        let b2 = (1.0 - cos_omega) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// RBJ highpass coefficients
    pub fn highpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        let freq = clamp_cutoff(freq, sample_rate);
        let q = q.max(0.05);
        let omega = 2.0 * PI * freq / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);

        let b0 = (1.0 + cos_omega) / 2.0;
        let b1 = -(1.0 + cos_omega);
        let b2 = (1.0 + cos_omega) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// Biquad filter using Transposed Direct Form II.
///
/// TDF-II is numerically favorable in floating point, minimizing quantization
/// noise in the recursive path.
#[derive(Debug, Clone)]
pub struct BiquadTdf2 {
    coeffs: BiquadCoeffs,
    z1: f64,
    z2: f64,
    sample_rate: f64,
}

impl BiquadTdf2 {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            coeffs: BiquadCoeffs {
                b0: 1.0,
                ..Default::default()
            },
            z1: 0.0,
            z2: 0.0,
            sample_rate,
        }
    }

    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    pub fn set_lowpass(&mut self, freq: f64, q: f64) {
        self.coeffs = BiquadCoeffs::lowpass(freq, q, self.sample_rate);
    }

    pub fn set_highpass(&mut self, freq: f64, q: f64) {
        self.coeffs = BiquadCoeffs::highpass(freq, q, self.sample_rate);
    }

    /// Flush recursive state out of the denormal range
    pub fn flush(&mut self) {
        self.z1 = flush_denormal(self.z1);
        self.z2 = flush_denormal(self.z2);
    }
}

impl Processor for BiquadTdf2 {
    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

impl MonoProcessor for BiquadTdf2 {
    #[inline]
    fn process_sample(&mut self, input: Sample) -> Sample {
        let x = input as f64;
        let c = &self.coeffs;
        let y = c.b0 * x + self.z1;
        self.z1 = c.b1 * x - c.a1 * y + self.z2;
        self.z2 = c.b2 * x - c.a2 * y;
        y as Sample
    }
}

impl ProcessorConfig for BiquadTdf2 {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }
}

// ============ State-Variable Filter ============

/// SVF output mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SvfMode {
    #[default]
    Lowpass,
    Highpass,
    Bandpass,
}

/// State-variable filter, TPT (topology-preserving transform) integrator core.
///
/// Numerically stable under per-sample cutoff modulation, which makes it the
/// filter of choice for envelope-swept voices and the delay feedback path.
#[derive(Debug, Clone)]
pub struct StateVariableFilter {
    ic1eq: f64,
    ic2eq: f64,
    // Coefficients derived from cutoff/resonance
    g: f64,
    k: f64,
    a1: f64,
    a2: f64,
    a3: f64,
    mode: SvfMode,
    cutoff: f64,
    resonance: f64,
    sample_rate: f64,
}

impl StateVariableFilter {
    pub fn new(sample_rate: f64) -> Self {
        let mut svf = Self {
            ic1eq: 0.0,
            ic2eq: 0.0,
            g: 0.0,
            k: 0.0,
            a1: 0.0,
            a2: 0.0,
            a3: 0.0,
            mode: SvfMode::Lowpass,
            cutoff: 1000.0,
            resonance: 0.0,
            sample_rate,
        };
        svf.update_coeffs();
        svf
    }

    pub fn set_mode(&mut self, mode: SvfMode) {
        self.mode = mode;
    }

    /// Set cutoff frequency in Hz (clamped to the stable range)
    #[inline]
    pub fn set_cutoff(&mut self, freq: f64) {
        let freq = clamp_cutoff(freq, self.sample_rate);
        if freq != self.cutoff {
            self.cutoff = freq;
            self.update_coeffs();
        }
    }

    /// Set resonance (0 = none, 1 = self-oscillation threshold)
    pub fn set_resonance(&mut self, resonance: f64) {
        let resonance = resonance.clamp(0.0, 0.98);
        if resonance != self.resonance {
            self.resonance = resonance;
            self.update_coeffs();
        }
    }

    fn update_coeffs(&mut self) {
        self.g = (PI * self.cutoff / self.sample_rate).tan();
        self.k = 2.0 - 2.0 * self.resonance;
        self.a1 = 1.0 / (1.0 + self.g * (self.g + self.k));
        self.a2 = self.g * self.a1;
        self.a3 = self.g * self.a2;
    }

    /// Process one sample in f64 (used by voices that mix in double precision)
    #[inline]
    pub fn process_f64(&mut self, v0: f64) -> f64 {
        let v3 = v0 - self.ic2eq;
        let v1 = self.a1 * self.ic1eq + self.a2 * v3;
        let v2 = self.ic2eq + self.a2 * self.ic1eq + self.a3 * v3;
        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;
        match self.mode {
            SvfMode::Lowpass => v2,
            SvfMode::Bandpass => v1,
            SvfMode::Highpass => v0 - self.k * v1 - v2,
        }
    }

    /// Flush recursive state out of the denormal range
    pub fn flush(&mut self) {
        self.ic1eq = flush_denormal(self.ic1eq);
        self.ic2eq = flush_denormal(self.ic2eq);
    }
}

impl Processor for StateVariableFilter {
    fn reset(&mut self) {
        self.ic1eq = 0.0;
        self.ic2eq = 0.0;
    }
}

impl MonoProcessor for StateVariableFilter {
    #[inline]
    fn process_sample(&mut self, input: Sample) -> Sample {
        self.process_f64(input as f64) as Sample
    }
}

impl ProcessorConfig for StateVariableFilter {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.cutoff = clamp_cutoff(self.cutoff, sample_rate);
        self.update_coeffs();
    }
}

// ============ Ladder Filter ============

/// 24 dB/oct ladder filter: four cascaded one-pole stages with saturating
/// resonance feedback from the last stage.
#[derive(Debug, Clone)]
pub struct LadderFilter {
    stages: [f64; 4],
    g: f64,
    resonance: f64,
    cutoff: f64,
    sample_rate: f64,
}

impl LadderFilter {
    pub fn new(sample_rate: f64) -> Self {
        let mut f = Self {
            stages: [0.0; 4],
            g: 0.0,
            resonance: 0.0,
            cutoff: 1000.0,
            sample_rate,
        };
        f.update_coeffs();
        f
    }

    #[inline]
    pub fn set_cutoff(&mut self, freq: f64) {
        let freq = clamp_cutoff(freq, self.sample_rate);
        if freq != self.cutoff {
            self.cutoff = freq;
            self.update_coeffs();
        }
    }

    pub fn set_resonance(&mut self, resonance: f64) {
        self.resonance = resonance.clamp(0.0, 1.1);
    }

    fn update_coeffs(&mut self) {
        // One-pole gain for the requested cutoff; capped below unity so the
        // cascade stays stable at cutoffs near Nyquist
        self.g = (1.0 - (-2.0 * PI * self.cutoff / self.sample_rate).exp()).min(0.999);
    }

    /// Process one sample in f64
    #[inline]
    pub fn process_f64(&mut self, input: f64) -> f64 {
        let feedback = self.resonance * 4.0 * self.stages[3];
        let x = (input - feedback).tanh();
        self.stages[0] += self.g * (x - self.stages[0]);
        self.stages[1] += self.g * (self.stages[0] - self.stages[1]);
        self.stages[2] += self.g * (self.stages[1] - self.stages[2]);
        self.stages[3] += self.g * (self.stages[2] - self.stages[3]);
        self.stages[3]
    }

    /// Flush recursive state out of the denormal range
    pub fn flush(&mut self) {
        for s in &mut self.stages {
            *s = flush_denormal(*s);
        }
    }
}

impl Processor for LadderFilter {
    fn reset(&mut self) {
        self.stages = [0.0; 4];
    }
}

impl MonoProcessor for LadderFilter {
    #[inline]
    fn process_sample(&mut self, input: Sample) -> Sample {
        self.process_f64(input as f64) as Sample
    }
}

impl ProcessorConfig for LadderFilter {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.cutoff = clamp_cutoff(self.cutoff, sample_rate);
        self.update_coeffs();
    }
}
