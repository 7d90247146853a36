//! Polyphase FIR oversampling
//!
//! Nonlinear processing generates harmonics that alias back into the audible
//! band. The oversampler upsamples, runs the nonlinear stage at the higher
//! rate, then lowpass-filters and decimates. Kaiser-windowed sinc prototypes,
//! decomposed into polyphase branches. All scratch is sized at construction;
//! the process path never allocates.

use std::f64::consts::PI;

/// Oversampling factor (quality selector for the nonlinear units)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OversampleFactor {
    /// No oversampling
    X1,
    /// 2x oversampling
    #[default]
    X2,
    /// 4x oversampling
    X4,
}

impl OversampleFactor {
    pub const LABELS: [&'static str; 3] = ["1x", "2x", "4x"];

    pub fn from_index(index: usize) -> Self {
        match index {
            0 => Self::X1,
            1 => Self::X2,
            _ => Self::X4,
        }
    }

    pub fn factor(&self) -> usize {
        match self {
            Self::X1 => 1,
            Self::X2 => 2,
            Self::X4 => 4,
        }
    }

    /// Total prototype filter order for this factor
    fn filter_order(&self) -> usize {
        match self {
            Self::X1 => 0,
            Self::X2 => 32,
            Self::X4 => 64,
        }
    }
}

/// Polyphase FIR branch filter (one per conversion direction and channel)
#[derive(Debug, Clone)]
struct PolyphaseFilter {
    num_phases: usize,
    taps_per_phase: usize,
    /// Coefficients organized [phase][tap]
    coeffs: Vec<Vec<f64>>,
    /// Delay-line state
    state: Vec<f64>,
    state_pos: usize,
}

impl PolyphaseFilter {
    fn new(factor: OversampleFactor) -> Self {
        let num_phases = factor.factor();
        if num_phases == 1 {
            return Self {
                num_phases: 1,
                taps_per_phase: 1,
                coeffs: vec![vec![1.0]],
                state: vec![0.0],
                state_pos: 0,
            };
        }

        let total_taps = factor.filter_order();
        let taps_per_phase = total_taps / num_phases;

        // Lowpass at the original Nyquist, expressed at the oversampled rate
        let cutoff = 0.5 / num_phases as f64;
        let transition = 0.1 / num_phases as f64;
        let prototype = design_lowpass(total_taps, cutoff, transition, 96.0);

        let mut coeffs = vec![vec![0.0; taps_per_phase]; num_phases];
        for (i, &c) in prototype.iter().enumerate() {
            let phase = i % num_phases;
            let tap = i / num_phases;
            if tap < taps_per_phase {
                // Compensate for interpolation gain
                coeffs[phase][tap] = c * num_phases as f64;
            }
        }

        Self {
            num_phases,
            taps_per_phase,
            coeffs,
            state: vec![0.0; taps_per_phase],
            state_pos: 0,
        }
    }

    /// Upsample one input sample into `num_phases` output samples
    #[inline]
    fn upsample_into(&mut self, input: f64, out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.num_phases);
        self.state[self.state_pos] = input;

        for (phase, slot) in out.iter_mut().enumerate() {
            let mut sum = 0.0;
            for tap in 0..self.taps_per_phase {
                let state_idx = (self.state_pos + self.taps_per_phase - tap) % self.taps_per_phase;
                sum += self.state[state_idx] * self.coeffs[phase][tap];
            }
            *slot = sum;
        }

        self.state_pos = (self.state_pos + 1) % self.taps_per_phase;
    }

    /// Decimate `num_phases` input samples into one output sample
    #[inline]
    fn downsample(&mut self, input: &[f64]) -> f64 {
        debug_assert_eq!(input.len(), self.num_phases);
        self.state[self.state_pos] = input[0];

        let mut sum = 0.0;
        for tap in 0..self.taps_per_phase {
            let state_idx = (self.state_pos + self.taps_per_phase - tap) % self.taps_per_phase;
            sum += self.state[state_idx] * self.coeffs[0][tap];
        }

        self.state_pos = (self.state_pos + 1) % self.taps_per_phase;
        sum
    }

    fn reset(&mut self) {
        self.state.fill(0.0);
        self.state_pos = 0;
    }
}

/// Kaiser-windowed sinc lowpass design
fn design_lowpass(num_taps: usize, cutoff: f64, transition: f64, atten_db: f64) -> Vec<f64> {
    let mut coeffs = vec![0.0; num_taps];
    let m = num_taps - 1;

    let beta = if atten_db > 50.0 {
        0.1102 * (atten_db - 8.7)
    } else if atten_db >= 21.0 {
        0.5842 * (atten_db - 21.0).powf(0.4) + 0.07886 * (atten_db - 21.0)
    } else {
        0.0
    };

    let fc = cutoff + transition / 2.0;
    for (i, coeff) in coeffs.iter_mut().enumerate() {
        let n = i as f64 - m as f64 / 2.0;
        let sinc = if n.abs() < 1e-10 {
            2.0 * fc
        } else {
            (2.0 * PI * fc * n).sin() / (PI * n)
        };

        let alpha = m as f64 / 2.0;
        let arg = 1.0 - ((i as f64 - alpha) / alpha).powi(2);
        let window = if arg > 0.0 {
            bessel_i0(beta * arg.sqrt()) / bessel_i0(beta)
        } else {
            0.0
        };

        *coeff = sinc * window;
    }

    // Normalize for unity gain at DC
    let sum: f64 = coeffs.iter().sum();
    if sum.abs() > 1e-10 {
        for c in &mut coeffs {
            *c /= sum;
        }
    }

    coeffs
}

/// Modified Bessel function I0 (polynomial approximation)
fn bessel_i0(x: f64) -> f64 {
    let ax = x.abs();
    if ax < 3.75 {
        let y = (x / 3.75).powi(2);
        1.0 + y
            * (3.5156229
                + y * (3.0899424
                    + y * (1.2067492 + y * (0.2659732 + y * (0.0360768 + y * 0.0045813)))))
    } else {
        let y = 3.75 / ax;
        (ax.exp() / ax.sqrt())
            * (0.39894228
                + y * (0.01328592
                    + y * (0.00225319
                        + y * (-0.00157565
                            + y * (0.00916281
                                + y * (-0.02057706
                                    + y * (0.02635537 + y * (-0.01647633 + y * 0.00392377))))))))
    }
}

/// Stereo oversampler: upsample → closure at the oversampled rate → decimate
#[derive(Debug, Clone)]
pub struct Oversampler {
    factor: OversampleFactor,
    upsample_l: PolyphaseFilter,
    upsample_r: PolyphaseFilter,
    downsample_l: PolyphaseFilter,
    downsample_r: PolyphaseFilter,
    os_buffer_l: Vec<f64>,
    os_buffer_r: Vec<f64>,
    phase_scratch: Vec<f64>,
    max_block: usize,
}

impl Oversampler {
    /// `max_block` bounds the block length this oversampler will ever see;
    /// all scratch is sized here.
    pub fn new(factor: OversampleFactor, max_block: usize) -> Self {
        let max_block = max_block.max(1);
        Self {
            factor,
            upsample_l: PolyphaseFilter::new(factor),
            upsample_r: PolyphaseFilter::new(factor),
            downsample_l: PolyphaseFilter::new(factor),
            downsample_r: PolyphaseFilter::new(factor),
            os_buffer_l: vec![0.0; max_block * factor.factor()],
            os_buffer_r: vec![0.0; max_block * factor.factor()],
            phase_scratch: vec![0.0; factor.factor()],
            max_block,
        }
    }

    pub fn factor(&self) -> OversampleFactor {
        self.factor
    }

    /// Latency through the up/down conversion pair, in samples
    pub fn latency(&self) -> usize {
        self.factor.filter_order() / self.factor.factor()
    }

    /// Process a stereo block, running `processor` at the oversampled rate.
    /// Blocks longer than `max_block` are processed in slices by the caller;
    /// slices are clamped here as a last resort.
    pub fn process<F>(&mut self, left: &mut [f64], right: &mut [f64], mut processor: F)
    where
        F: FnMut(&mut [f64], &mut [f64]),
    {
        if self.factor == OversampleFactor::X1 {
            processor(left, right);
            return;
        }

        let len = left.len().min(right.len()).min(self.max_block);
        let factor = self.factor.factor();
        let os_len = len * factor;

        for i in 0..len {
            self.upsample_l
                .upsample_into(left[i], &mut self.phase_scratch);
            self.os_buffer_l[i * factor..(i + 1) * factor].copy_from_slice(&self.phase_scratch);
            self.upsample_r
                .upsample_into(right[i], &mut self.phase_scratch);
            self.os_buffer_r[i * factor..(i + 1) * factor].copy_from_slice(&self.phase_scratch);
        }

        processor(
            &mut self.os_buffer_l[..os_len],
            &mut self.os_buffer_r[..os_len],
        );

        for i in 0..len {
            let start = i * factor;
            left[i] = self
                .downsample_l
                .downsample(&self.os_buffer_l[start..start + factor]);
            right[i] = self
                .downsample_r
                .downsample(&self.os_buffer_r[start..start + factor]);
        }
    }

    pub fn reset(&mut self) {
        self.upsample_l.reset();
        self.upsample_r.reset();
        self.downsample_l.reset();
        self.downsample_r.reset();
    }
}
