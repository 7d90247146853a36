//! Algorithmic reverb
//!
//! A fixed Schroeder topology (eight parallel damped feedback combs into four
//! series allpasses per channel, right channel offset for decorrelation)
//! behind a small parameter surface: room size, damping, width, mix, and
//! pre-delay. The algorithm itself is not user-configurable.

use ns_core::{Sample, flush_denormal};

use crate::{Processor, ProcessorConfig, StereoProcessor};

/// Comb delay lengths in samples at the 44.1 kHz reference rate
const COMB_TUNINGS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];

/// Allpass delay lengths at the reference rate
const ALLPASS_TUNINGS: [usize; 4] = [556, 441, 341, 225];

/// Right-channel offset for stereo decorrelation
const STEREO_SPREAD: usize = 23;

/// Input attenuation into the comb bank
const FIXED_GAIN: f64 = 0.015;

/// Maximum pre-delay
const MAX_PREDELAY_MS: f64 = 200.0;

/// Damped feedback comb filter
#[derive(Debug, Clone)]
struct Comb {
    buffer: Vec<f64>,
    pos: usize,
    feedback: f64,
    damp: f64,
    filter_store: f64,
}

impl Comb {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            pos: 0,
            feedback: 0.84,
            damp: 0.2,
            filter_store: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f64) -> f64 {
        let output = self.buffer[self.pos];
        self.filter_store = output * (1.0 - self.damp) + self.filter_store * self.damp;
        self.buffer[self.pos] = input + self.filter_store * self.feedback;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.filter_store = 0.0;
        self.pos = 0;
    }

    fn flush(&mut self) {
        self.filter_store = flush_denormal(self.filter_store);
    }
}

/// Schroeder allpass diffuser
#[derive(Debug, Clone)]
struct Allpass {
    buffer: Vec<f64>,
    pos: usize,
}

impl Allpass {
    const GAIN: f64 = 0.5;

    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f64) -> f64 {
        let delayed = self.buffer[self.pos];
        let output = -input + delayed;
        self.buffer[self.pos] = input + delayed * Self::GAIN;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }
}

/// Fixed algorithmic reverb with a thin parameter surface
#[derive(Debug)]
pub struct ReverbEngine {
    combs_l: Vec<Comb>,
    combs_r: Vec<Comb>,
    allpasses_l: Vec<Allpass>,
    allpasses_r: Vec<Allpass>,

    predelay_l: Vec<f64>,
    predelay_r: Vec<f64>,
    predelay_pos: usize,
    predelay_samples: usize,

    room_size: f64,
    damping: f64,
    width: f64,
    mix: f64,

    sample_rate: f64,
}

impl ReverbEngine {
    pub fn new(sample_rate: f64) -> Self {
        let scale = sample_rate / 44100.0;
        let scaled = |len: usize| ((len as f64 * scale) as usize).max(1);
        let max_predelay = (MAX_PREDELAY_MS * 0.001 * sample_rate) as usize + 1;

        let mut reverb = Self {
            combs_l: COMB_TUNINGS.iter().map(|&l| Comb::new(scaled(l))).collect(),
            combs_r: COMB_TUNINGS
                .iter()
                .map(|&l| Comb::new(scaled(l + STEREO_SPREAD)))
                .collect(),
            allpasses_l: ALLPASS_TUNINGS
                .iter()
                .map(|&l| Allpass::new(scaled(l)))
                .collect(),
            allpasses_r: ALLPASS_TUNINGS
                .iter()
                .map(|&l| Allpass::new(scaled(l + STEREO_SPREAD)))
                .collect(),
            predelay_l: vec![0.0; max_predelay],
            predelay_r: vec![0.0; max_predelay],
            predelay_pos: 0,
            predelay_samples: 0,
            room_size: 0.5,
            damping: 0.5,
            width: 1.0,
            mix: 0.3,
            sample_rate,
        };
        reverb.apply_comb_settings();
        reverb
    }

    pub fn set_room_size(&mut self, size: f64) {
        self.room_size = size.clamp(0.0, 1.0);
        self.apply_comb_settings();
    }

    pub fn set_damping(&mut self, damping: f64) {
        self.damping = damping.clamp(0.0, 1.0);
        self.apply_comb_settings();
    }

    pub fn set_width(&mut self, width: f64) {
        self.width = width.clamp(0.0, 1.0);
    }

    pub fn set_mix(&mut self, mix: f64) {
        self.mix = mix.clamp(0.0, 1.0);
    }

    pub fn set_predelay_ms(&mut self, ms: f64) {
        let ms = if ms.is_finite() {
            ms.clamp(0.0, MAX_PREDELAY_MS)
        } else {
            0.0
        };
        self.predelay_samples =
            ((ms * 0.001 * self.sample_rate) as usize).min(self.predelay_l.len() - 1);
    }

    fn apply_comb_settings(&mut self) {
        let feedback = 0.7 + self.room_size * 0.28;
        let damp = self.damping * 0.4;
        for comb in self.combs_l.iter_mut().chain(self.combs_r.iter_mut()) {
            comb.feedback = feedback;
            comb.damp = damp;
        }
    }

    #[inline]
    fn predelayed(&mut self, left: f64, right: f64) -> (f64, f64) {
        if self.predelay_samples == 0 {
            return (left, right);
        }
        let len = self.predelay_l.len();
        let read = (self.predelay_pos + len - self.predelay_samples) % len;
        let out = (self.predelay_l[read], self.predelay_r[read]);
        self.predelay_l[self.predelay_pos] = left;
        self.predelay_r[self.predelay_pos] = right;
        self.predelay_pos = (self.predelay_pos + 1) % len;
        out
    }

    pub fn process_block(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        let n = left.len().min(right.len());
        for i in 0..n {
            (left[i], right[i]) = StereoProcessor::process_sample(self, left[i], right[i]);
        }
        for comb in self.combs_l.iter_mut().chain(self.combs_r.iter_mut()) {
            comb.flush();
        }
    }
}

impl Processor for ReverbEngine {
    fn reset(&mut self) {
        for comb in self.combs_l.iter_mut().chain(self.combs_r.iter_mut()) {
            comb.reset();
        }
        for ap in self.allpasses_l.iter_mut().chain(self.allpasses_r.iter_mut()) {
            ap.reset();
        }
        self.predelay_l.fill(0.0);
        self.predelay_r.fill(0.0);
        self.predelay_pos = 0;
    }
}

impl StereoProcessor for ReverbEngine {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        let (dry_l, dry_r) = (left as f64, right as f64);
        let (in_l, in_r) = self.predelayed(dry_l, dry_r);
        let input = (in_l + in_r) * FIXED_GAIN;

        let mut wet_l = 0.0;
        for comb in &mut self.combs_l {
            wet_l += comb.process(input);
        }
        let mut wet_r = 0.0;
        for comb in &mut self.combs_r {
            wet_r += comb.process(input);
        }

        for ap in &mut self.allpasses_l {
            wet_l = ap.process(wet_l);
        }
        for ap in &mut self.allpasses_r {
            wet_r = ap.process(wet_r);
        }

        // Width: blend the decorrelated wet channels toward mono
        let wet1 = self.width * 0.5 + 0.5;
        let wet2 = (1.0 - self.width) * 0.5;
        let out_l = wet_l * wet1 + wet_r * wet2;
        let out_r = wet_r * wet1 + wet_l * wet2;

        (
            (dry_l * (1.0 - self.mix) + out_l * self.mix) as Sample,
            (dry_r * (1.0 - self.mix) + out_r * self.mix) as Sample,
        )
    }
}

impl ProcessorConfig for ReverbEngine {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        if sample_rate > 0.0 && sample_rate != self.sample_rate {
            *self = Self::new(sample_rate);
        }
    }
}
