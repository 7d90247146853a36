//! Saturation: oversampled waveshaping with glitch-free reconfiguration
//!
//! Three transfer curves behind input/output trim, drive, tone, and DC bias,
//! processed at 1x/2x/4x through the polyphase oversampler. Curve or quality
//! changes are never applied instantaneously: the wet path rides an
//! equal-power sine/cosine crossfade spanning ~10 ms — old configuration out,
//! internal state reset at the silent midpoint, new configuration in.

use ns_core::Sample;
use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;

use crate::filters::BiquadTdf2;
use crate::metering::{MeterCell, PeakMeter};
use crate::oversampling::{OversampleFactor, Oversampler};
use crate::smoothing::{SmoothedParam, SmoothingType};
use crate::{MonoProcessor, Processor, ProcessorConfig};

/// Transfer curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaturationCurve {
    /// tanh soft clip
    #[default]
    Soft,
    /// (2/π)·atan, gentler knee
    Smooth,
    /// Hard clip to [-1, 1]
    Hard,
}

impl SaturationCurve {
    pub const LABELS: [&'static str; 3] = ["Soft", "Smooth", "Hard"];

    pub fn from_index(index: usize) -> Self {
        match index {
            0 => Self::Soft,
            1 => Self::Smooth,
            _ => Self::Hard,
        }
    }

    #[inline]
    fn shape(&self, x: f64) -> f64 {
        match self {
            Self::Soft => x.tanh(),
            Self::Smooth => std::f64::consts::FRAC_2_PI * x.atan(),
            Self::Hard => x.clamp(-1.0, 1.0),
        }
    }
}

/// Drive knob skew: low drive settings get finer resolution
const DRIVE_SKEW: f64 = 1.25;

/// Maximum drive in dB at full knob
const DRIVE_RANGE_DB: f64 = 36.0;

/// Minimum crossfade length in samples
const MIN_TRANSITION_SAMPLES: usize = 32;

/// Saturation engine
#[derive(Debug)]
pub struct SaturationEngine {
    // Active and requested configuration
    curve: SaturationCurve,
    quality: OversampleFactor,
    target_curve: SaturationCurve,
    target_quality: OversampleFactor,

    // Crossfade state: position within [0, transition_len); the configuration
    // switch and state reset happen at the midpoint
    transition_pos: usize,
    transition_len: usize,
    transitioning: bool,

    drive_norm: f64,
    input_trim: SmoothedParam,
    output_trim: SmoothedParam,
    bias: SmoothedParam,
    tone_hz: f64,
    mix: SmoothedParam,

    // One oversampler per quality, preallocated so switching never allocates
    oversamplers: [Oversampler; 3],
    tone_l: BiquadTdf2,
    tone_r: BiquadTdf2,

    // Scratch: dry cache and f64 working buffers, sized at construction
    dry_l: Vec<f64>,
    dry_r: Vec<f64>,
    work_l: Vec<f64>,
    work_r: Vec<f64>,

    input_meter: PeakMeter,
    output_meter: PeakMeter,

    sample_rate: f64,
    max_block: usize,
}

impl SaturationEngine {
    pub fn new(sample_rate: f64, max_block: usize) -> Self {
        let max_block = max_block.max(32);
        let mut engine = Self {
            curve: SaturationCurve::Soft,
            quality: OversampleFactor::X2,
            target_curve: SaturationCurve::Soft,
            target_quality: OversampleFactor::X2,
            transition_pos: 0,
            transition_len: Self::transition_samples(sample_rate),
            transitioning: false,
            drive_norm: 0.3,
            input_trim: SmoothedParam::new(1.0, 20.0, sample_rate, SmoothingType::Exponential),
            output_trim: SmoothedParam::new(1.0, 20.0, sample_rate, SmoothingType::Exponential),
            bias: SmoothedParam::new(0.0, 20.0, sample_rate, SmoothingType::Exponential),
            tone_hz: 12000.0,
            mix: SmoothedParam::new(1.0, 20.0, sample_rate, SmoothingType::Exponential),
            oversamplers: [
                Oversampler::new(OversampleFactor::X1, max_block),
                Oversampler::new(OversampleFactor::X2, max_block),
                Oversampler::new(OversampleFactor::X4, max_block),
            ],
            tone_l: BiquadTdf2::new(sample_rate),
            tone_r: BiquadTdf2::new(sample_rate),
            dry_l: vec![0.0; max_block],
            dry_r: vec![0.0; max_block],
            work_l: vec![0.0; max_block],
            work_r: vec![0.0; max_block],
            input_meter: PeakMeter::new(sample_rate, 300.0),
            output_meter: PeakMeter::new(sample_rate, 300.0),
            sample_rate,
            max_block,
        };
        engine.update_tone_filters();
        engine
    }

    fn transition_samples(sample_rate: f64) -> usize {
        ((sample_rate * 0.01) as usize).max(MIN_TRANSITION_SAMPLES)
    }

    // ---- Parameters ----

    /// Request a transfer curve; the change crossfades in over ~10 ms
    pub fn set_curve(&mut self, curve: SaturationCurve) {
        self.target_curve = curve;
    }

    /// Request an oversampling quality; the change crossfades in over ~10 ms
    pub fn set_quality(&mut self, quality: OversampleFactor) {
        self.target_quality = quality;
    }

    /// Drive knob position, 0..1, skewed toward fine low-end resolution
    pub fn set_drive(&mut self, drive: f64) {
        self.drive_norm = drive.clamp(0.0, 1.0);
    }

    pub fn set_input_trim_db(&mut self, db: f64) {
        let db = db.clamp(-24.0, 24.0);
        self.input_trim.set_target(10.0_f64.powf(db / 20.0));
    }

    pub fn set_output_trim_db(&mut self, db: f64) {
        let db = db.clamp(-24.0, 24.0);
        self.output_trim.set_target(10.0_f64.powf(db / 20.0));
    }

    /// DC bias added before the shaper (asymmetry → even harmonics)
    pub fn set_bias(&mut self, bias: f64) {
        self.bias.set_target(bias.clamp(-0.25, 0.25));
    }

    /// Post-shaper lowpass cutoff, applied at the oversampled rate
    pub fn set_tone_hz(&mut self, hz: f64) {
        self.tone_hz = if hz.is_finite() {
            hz.clamp(500.0, 20000.0)
        } else {
            12000.0
        };
        self.update_tone_filters();
    }

    pub fn set_mix(&mut self, mix: f64) {
        self.mix.set_target(mix.clamp(0.0, 1.0));
    }

    pub fn input_meter(&self) -> Arc<MeterCell> {
        self.input_meter.handle()
    }

    pub fn output_meter(&self) -> Arc<MeterCell> {
        self.output_meter.handle()
    }

    pub fn active_curve(&self) -> SaturationCurve {
        self.curve
    }

    pub fn is_transitioning(&self) -> bool {
        self.transitioning
    }

    fn quality_index(quality: OversampleFactor) -> usize {
        match quality {
            OversampleFactor::X1 => 0,
            OversampleFactor::X2 => 1,
            OversampleFactor::X4 => 2,
        }
    }

    fn update_tone_filters(&mut self) {
        // The tone filter runs inside the oversampled closure
        let os_rate = self.sample_rate * self.quality.factor() as f64;
        self.tone_l.set_sample_rate(os_rate);
        self.tone_r.set_sample_rate(os_rate);
        let hz = self.tone_hz.min(os_rate * 0.45);
        self.tone_l.set_lowpass(hz, 0.707);
        self.tone_r.set_lowpass(hz, 0.707);
    }

    /// Wet gain for the crossfade at the current transition position
    #[inline]
    fn transition_gain(&self) -> f64 {
        if !self.transitioning {
            return 1.0;
        }
        let half = (self.transition_len / 2).max(1);
        if self.transition_pos < half {
            (FRAC_PI_2 * self.transition_pos as f64 / half as f64).cos()
        } else {
            (FRAC_PI_2 * (self.transition_pos - half) as f64 / half as f64).sin()
        }
    }

    /// Process a stereo block in place
    pub fn process_block(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        let n = left.len().min(right.len());
        let mut start = 0;
        while start < n {
            let mut chunk = (n - start).min(self.max_block);

            // Arm a pending reconfiguration
            if !self.transitioning
                && (self.target_curve != self.curve || self.target_quality != self.quality)
            {
                self.transitioning = true;
                self.transition_pos = 0;
                self.transition_len = Self::transition_samples(self.sample_rate);
            }

            // Sub-chunk so the midpoint switch lands on a chunk boundary
            if self.transitioning {
                let half = (self.transition_len / 2).max(1);
                let remaining = if self.transition_pos < half {
                    half - self.transition_pos
                } else {
                    self.transition_len - self.transition_pos
                };
                chunk = chunk.min(remaining.max(1));
            }

            self.process_chunk(
                &mut left[start..start + chunk],
                &mut right[start..start + chunk],
            );
            start += chunk;

            // Midpoint: the old configuration has faded to silence; switch
            // and reset internal DSP state before fading the new one in
            if self.transitioning {
                let half = (self.transition_len / 2).max(1);
                if self.transition_pos == half {
                    self.curve = self.target_curve;
                    self.quality = self.target_quality;
                    self.oversamplers[Self::quality_index(self.quality)].reset();
                    self.tone_l.reset();
                    self.tone_r.reset();
                    self.update_tone_filters();
                }
                if self.transition_pos >= self.transition_len {
                    self.transitioning = false;
                }
            }
        }
    }

    fn process_chunk(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        let n = left.len();
        if n == 0 {
            return;
        }

        // Cache dry and apply the input trim into the working buffers
        for i in 0..n {
            let trim = self.input_trim.next();
            self.dry_l[i] = left[i] as f64;
            self.dry_r[i] = right[i] as f64;
            self.work_l[i] = self.dry_l[i] * trim + self.bias.next();
            self.work_r[i] = self.dry_r[i] * trim + self.bias.current();
        }
        self.input_meter
            .process_stereo_f64(&self.work_l[..n], &self.work_r[..n]);

        // Skewed drive curve: the low end of the knob moves in smaller steps
        let drive_db = self.drive_norm.powf(DRIVE_SKEW) * DRIVE_RANGE_DB;
        let drive_gain = 10.0_f64.powf(drive_db / 20.0);

        let curve = self.curve;
        let tone_l = &mut self.tone_l;
        let tone_r = &mut self.tone_r;
        let os = &mut self.oversamplers[Self::quality_index(self.quality)];
        os.process(&mut self.work_l[..n], &mut self.work_r[..n], |osl, osr| {
            for (l, r) in osl.iter_mut().zip(osr.iter_mut()) {
                *l = tone_l.process_sample(curve.shape(*l * drive_gain) as Sample) as f64;
                *r = tone_r.process_sample(curve.shape(*r * drive_gain) as Sample) as f64;
            }
        });

        // Equal-power wet/dry, the wet leg scaled by the transition gain
        for i in 0..n {
            let gain = self.transition_gain();
            if self.transitioning {
                self.transition_pos += 1;
            }
            let effective_mix = self.mix.next() * gain;
            let wet_gain = (effective_mix * FRAC_PI_2).sin();
            let dry_gain = (effective_mix * FRAC_PI_2).cos();
            let trim = self.output_trim.next();
            self.work_l[i] = (self.dry_l[i] * dry_gain + self.work_l[i] * wet_gain) * trim;
            self.work_r[i] = (self.dry_r[i] * dry_gain + self.work_r[i] * wet_gain) * trim;
            left[i] = self.work_l[i] as Sample;
            right[i] = self.work_r[i] as Sample;
        }
        self.output_meter
            .process_stereo_f64(&self.work_l[..n], &self.work_r[..n]);
    }
}

impl Processor for SaturationEngine {
    fn reset(&mut self) {
        for os in &mut self.oversamplers {
            os.reset();
        }
        self.tone_l.reset();
        self.tone_r.reset();
        self.transitioning = false;
        self.transition_pos = 0;
        self.input_trim.reset();
        self.output_trim.reset();
        self.bias.reset();
        self.mix.reset();
        self.input_meter.reset();
        self.output_meter.reset();
    }

    fn latency(&self) -> usize {
        self.oversamplers[Self::quality_index(self.quality)].latency()
    }
}

impl ProcessorConfig for SaturationEngine {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.input_trim.set_sample_rate(sample_rate);
        self.output_trim.set_sample_rate(sample_rate);
        self.bias.set_sample_rate(sample_rate);
        self.mix.set_sample_rate(sample_rate);
        self.transition_len = Self::transition_samples(sample_rate);
        self.update_tone_filters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const SR: f64 = 48000.0;

    fn sine_block(start: usize, len: usize, freq: f64) -> Vec<Sample> {
        (start..start + len)
            .map(|i| ((2.0 * PI * freq * i as f64 / SR).sin() * 0.5) as Sample)
            .collect()
    }

    #[test]
    fn test_all_curves_bounded_and_finite() {
        for curve in [
            SaturationCurve::Soft,
            SaturationCurve::Smooth,
            SaturationCurve::Hard,
        ] {
            let mut sat = SaturationEngine::new(SR, 512);
            sat.set_curve(curve);
            sat.set_drive(1.0);
            sat.set_mix(1.0);
            // Run past the initial transition from default state
            for b in 0..8 {
                let mut l = sine_block(b * 512, 512, 220.0);
                let mut r = l.clone();
                sat.process_block(&mut l, &mut r);
                assert!(l.iter().all(|x| x.is_finite()));
                assert!(l.iter().all(|x| x.abs() < 4.0));
            }
        }
    }

    #[test]
    fn test_dry_mix_bypasses_shaper() {
        let mut sat = SaturationEngine::new(SR, 512);
        sat.set_mix(0.0);
        sat.set_drive(1.0);
        // Settle smoothers
        for b in 0..16 {
            let mut l = sine_block(b * 512, 512, 440.0);
            let mut r = l.clone();
            sat.process_block(&mut l, &mut r);
        }
        let input = sine_block(16 * 512, 512, 440.0);
        let mut l = input.clone();
        let mut r = input.clone();
        sat.process_block(&mut l, &mut r);
        for (a, b) in input.iter().zip(l.iter()) {
            assert!((a - b).abs() < 1e-3, "dry path altered: {} vs {}", a, b);
        }
    }

    #[test]
    fn test_curve_switch_has_no_pop() {
        let mut sat = SaturationEngine::new(SR, 512);
        sat.set_curve(SaturationCurve::Soft);
        sat.set_drive(0.8);
        sat.set_mix(1.0);

        // Steady state first, tracking the largest first-difference
        let mut prev: f64 = 0.0;
        let mut steady_delta: f64 = 0.0;
        for b in 0..32 {
            let mut l = sine_block(b * 512, 512, 330.0);
            let mut r = l.clone();
            sat.process_block(&mut l, &mut r);
            for &x in &l {
                steady_delta = steady_delta.max((x as f64 - prev).abs());
                prev = x as f64;
            }
        }

        // Switch mid-stream and measure the transition window
        sat.set_curve(SaturationCurve::Hard);
        let mut transition_delta: f64 = 0.0;
        for b in 32..40 {
            let mut l = sine_block(b * 512, 512, 330.0);
            let mut r = l.clone();
            sat.process_block(&mut l, &mut r);
            for &x in &l {
                transition_delta = transition_delta.max((x as f64 - prev).abs());
                prev = x as f64;
            }
        }
        assert_eq!(sat.active_curve(), SaturationCurve::Hard);
        // The crossfade keeps the switch within ~2x the steady-state slope
        assert!(
            transition_delta < steady_delta * 2.0 + 0.05,
            "transition delta {} steady {}",
            transition_delta,
            steady_delta
        );
    }

    #[test]
    fn test_quality_switch_settles() {
        let mut sat = SaturationEngine::new(SR, 256);
        sat.set_quality(OversampleFactor::X4);
        for b in 0..16 {
            let mut l = sine_block(b * 256, 256, 440.0);
            let mut r = l.clone();
            sat.process_block(&mut l, &mut r);
        }
        assert!(!sat.is_transitioning());
        assert_eq!(sat.latency(), 16);
    }

    #[test]
    fn test_meters_update() {
        let mut sat = SaturationEngine::new(SR, 512);
        let input_meter = sat.input_meter();
        let output_meter = sat.output_meter();
        assert_eq!(input_meter.db(), f64::NEG_INFINITY);
        let mut l = sine_block(0, 512, 440.0);
        let mut r = l.clone();
        sat.process_block(&mut l, &mut r);
        assert!(input_meter.db() > -20.0);
        assert!(output_meter.db() > -40.0);
    }

    #[test]
    fn test_blocks_larger_than_scratch_are_chunked() {
        let mut sat = SaturationEngine::new(SR, 64);
        let mut l = sine_block(0, 1024, 440.0);
        let mut r = l.clone();
        sat.process_block(&mut l, &mut r);
        assert!(l.iter().all(|x| x.is_finite()));
    }
}
