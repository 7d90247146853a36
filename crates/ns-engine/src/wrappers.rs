//! Unit wrappers: DSP state plus an atomic parameter surface
//!
//! Each wrapper owns one DSP unit and a `ParamSet` shared with the control
//! plane. At the start of every render call the wrapper loads each atomic
//! slot, clamps it through its descriptor, and applies it to the DSP —
//! parameter writes from the UI thread are therefore picked up at block rate
//! without locks. Mono views are mirrored through a preallocated scratch
//! channel and averaged back.

use ns_core::{ArpRate, Division, ParamDescriptor, ParamRange, ParamUnit, Sample};
use ns_dsp::arpeggiator::{ArpMode, Arpeggiator, EventSink};
use ns_dsp::chorus::Chorus;
use ns_dsp::delay::{DelayMode, StereoDelay};
use ns_dsp::metering::MeterCell;
use ns_dsp::oscillator::Waveform;
use ns_dsp::oversampling::OversampleFactor;
use ns_dsp::reverb::ReverbEngine;
use ns_dsp::saturation::{SaturationCurve, SaturationEngine};
use ns_dsp::spectrum::{SpectrumAnalyzer, SpectrumReader};
use ns_dsp::synth::{SynthEngine, VoiceFilterMode};
use ns_dsp::{Processor, ProcessorConfig, StereoProcessor};
use std::sync::Arc;

use crate::context::RenderContext;
use crate::params::ParamSet;

const OFF_ON: &[&str] = &["Off", "On"];

/// Mirror a mono view through the scratch channel, run a stereo closure,
/// and fold the result back to mono.
fn process_mono_via<F>(buffer: &mut [Sample], scratch: &mut [Sample], f: F)
where
    F: FnOnce(&mut [Sample], &mut [Sample]),
{
    let n = buffer.len().min(scratch.len());
    scratch[..n].copy_from_slice(&buffer[..n]);
    let (l, r) = (&mut buffer[..n], &mut scratch[..n]);
    f(&mut *l, &mut *r);
    for (a, b) in l.iter_mut().zip(r.iter()) {
        *a = (*a + *b) * 0.5;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SYNTH
// ═══════════════════════════════════════════════════════════════════════════════

/// Polyphonic synthesizer unit
pub struct SynthUnit {
    params: Arc<ParamSet<19>>,
    dsp: SynthEngine,
    scratch_l: Vec<Sample>,
    scratch_r: Vec<Sample>,
}

impl SynthUnit {
    pub const WAVEFORM: usize = 0;
    pub const TUNING: usize = 1;
    pub const UNISON_ORDER: usize = 2;
    pub const UNISON_DETUNE: usize = 3;
    pub const UNISON_SPREAD: usize = 4;
    pub const RETRIGGER: usize = 5;
    pub const AMP_ATTACK: usize = 6;
    pub const AMP_DECAY: usize = 7;
    pub const AMP_SUSTAIN: usize = 8;
    pub const AMP_RELEASE: usize = 9;
    pub const FILTER_ATTACK: usize = 10;
    pub const FILTER_DECAY: usize = 11;
    pub const FILTER_SUSTAIN: usize = 12;
    pub const FILTER_RELEASE: usize = 13;
    pub const FILTER_MODE: usize = 14;
    pub const CUTOFF: usize = 15;
    pub const RESONANCE: usize = 16;
    pub const ENV_AMOUNT: usize = 17;
    pub const MASTER_GAIN: usize = 18;

    const DESCRIPTORS: [ParamDescriptor; 19] = [
        ParamDescriptor::new(0, "Waveform", ParamRange::stepped(4, 1.0), ParamUnit::Choice(&Waveform::LABELS)),
        ParamDescriptor::new(1, "Tuning", ParamRange::linear(-1200.0, 1200.0, 0.0), ParamUnit::Cents),
        ParamDescriptor::new(2, "Unison", ParamRange::linear(1.0, 5.0, 1.0), ParamUnit::Plain),
        ParamDescriptor::new(3, "Unison Detune", ParamRange::linear(0.0, 100.0, 10.0), ParamUnit::Cents),
        ParamDescriptor::new(4, "Unison Spread", ParamRange::linear(0.0, 1.0, 0.5), ParamUnit::Percent),
        ParamDescriptor::new(5, "Retrigger", ParamRange::stepped(2, 0.0), ParamUnit::Choice(OFF_ON)),
        ParamDescriptor::new(6, "Amp Attack", ParamRange::logarithmic(0.1, 5000.0, 5.0), ParamUnit::Milliseconds),
        ParamDescriptor::new(7, "Amp Decay", ParamRange::logarithmic(1.0, 5000.0, 100.0), ParamUnit::Milliseconds),
        ParamDescriptor::new(8, "Amp Sustain", ParamRange::linear(0.0, 1.0, 0.8), ParamUnit::Percent),
        ParamDescriptor::new(9, "Amp Release", ParamRange::logarithmic(1.0, 10000.0, 200.0), ParamUnit::Milliseconds),
        ParamDescriptor::new(10, "Filter Attack", ParamRange::logarithmic(0.1, 5000.0, 5.0), ParamUnit::Milliseconds),
        ParamDescriptor::new(11, "Filter Decay", ParamRange::logarithmic(1.0, 5000.0, 150.0), ParamUnit::Milliseconds),
        ParamDescriptor::new(12, "Filter Sustain", ParamRange::linear(0.0, 1.0, 0.3), ParamUnit::Percent),
        ParamDescriptor::new(13, "Filter Release", ParamRange::logarithmic(1.0, 10000.0, 200.0), ParamUnit::Milliseconds),
        ParamDescriptor::new(14, "Filter Type", ParamRange::stepped(2, 0.0), ParamUnit::Choice(&VoiceFilterMode::LABELS)),
        ParamDescriptor::new(15, "Cutoff", ParamRange::logarithmic(20.0, 20000.0, 8000.0), ParamUnit::Hertz),
        ParamDescriptor::new(16, "Resonance", ParamRange::linear(0.0, 1.0, 0.1), ParamUnit::Percent),
        ParamDescriptor::new(17, "Env Amount", ParamRange::linear(-60.0, 60.0, 24.0), ParamUnit::Semitones),
        ParamDescriptor::new(18, "Master", ParamRange::linear(0.0, 2.0, 0.7), ParamUnit::Plain),
    ];

    pub fn new(sample_rate: f64, max_block: usize) -> Self {
        Self {
            params: ParamSet::new(&Self::DESCRIPTORS),
            dsp: SynthEngine::new(sample_rate),
            scratch_l: vec![0.0; max_block],
            scratch_r: vec![0.0; max_block],
        }
    }

    pub fn params(&self) -> Arc<ParamSet<19>> {
        Arc::clone(&self.params)
    }

    fn apply_params(&mut self) {
        let p = &self.params;
        self.dsp
            .set_waveform(Waveform::from_index(p.get_index(Self::WAVEFORM)));
        self.dsp.set_tuning_cents(p.get(Self::TUNING));
        self.dsp.set_unison(
            p.get_index(Self::UNISON_ORDER),
            p.get(Self::UNISON_DETUNE),
            p.get(Self::UNISON_SPREAD),
        );
        self.dsp.set_retrigger(p.get_bool(Self::RETRIGGER));
        self.dsp.set_amp_adsr(
            p.get(Self::AMP_ATTACK),
            p.get(Self::AMP_DECAY),
            p.get(Self::AMP_SUSTAIN),
            p.get(Self::AMP_RELEASE),
        );
        self.dsp.set_filter_adsr(
            p.get(Self::FILTER_ATTACK),
            p.get(Self::FILTER_DECAY),
            p.get(Self::FILTER_SUSTAIN),
            p.get(Self::FILTER_RELEASE),
        );
        self.dsp
            .set_filter_mode(VoiceFilterMode::from_index(p.get_index(Self::FILTER_MODE)));
        self.dsp.set_cutoff(p.get(Self::CUTOFF));
        self.dsp.set_resonance(p.get(Self::RESONANCE));
        self.dsp.set_env_amount(p.get(Self::ENV_AMOUNT));
        self.dsp.set_master_gain(p.get(Self::MASTER_GAIN));
    }

    pub fn render(&mut self, ctx: &mut RenderContext) {
        self.apply_params();
        match &mut ctx.buffer {
            Some(buffer) => match &mut buffer.right {
                Some(right) => self.dsp.render(buffer.left, right, ctx.events),
                None => {
                    let n = buffer.left.len().min(self.scratch_l.len());
                    self.scratch_l[..n].fill(0.0);
                    self.scratch_r[..n].fill(0.0);
                    self.dsp.render(
                        &mut self.scratch_l[..n],
                        &mut self.scratch_r[..n],
                        ctx.events,
                    );
                    for i in 0..n {
                        buffer.left[i] += (self.scratch_l[i] + self.scratch_r[i]) * 0.5;
                    }
                }
            },
            // No audio this call: note events still have to reach the voices
            None => {
                self.dsp.render(&mut [], &mut [], ctx.events);
            }
        }
    }

    pub fn initialise(&mut self, sample_rate: f64, max_block: usize) {
        self.dsp.set_sample_rate(sample_rate);
        self.scratch_l = vec![0.0; max_block];
        self.scratch_r = vec![0.0; max_block];
        self.dsp.reset();
    }

    pub fn reset(&mut self) {
        self.dsp.reset();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DELAY
// ═══════════════════════════════════════════════════════════════════════════════

/// Multi-mode delay unit
pub struct DelayUnit {
    params: Arc<ParamSet<10>>,
    dsp: StereoDelay,
    scratch: Vec<Sample>,
}

impl DelayUnit {
    pub const MODE: usize = 0;
    pub const TIME_MS: usize = 1;
    pub const OFFSET_MS: usize = 2;
    pub const SYNC: usize = 3;
    pub const DIVISION: usize = 4;
    pub const FEEDBACK: usize = 5;
    pub const PING_PONG: usize = 6;
    pub const HP_CUTOFF: usize = 7;
    pub const LP_CUTOFF: usize = 8;
    pub const MIX: usize = 9;

    const DESCRIPTORS: [ParamDescriptor; 10] = [
        ParamDescriptor::new(0, "Mode", ParamRange::stepped(4, 1.0), ParamUnit::Choice(&DelayMode::LABELS)),
        ParamDescriptor::new(1, "Time", ParamRange::logarithmic(1.0, 2000.0, 500.0), ParamUnit::Milliseconds),
        ParamDescriptor::new(2, "Offset", ParamRange::linear(-200.0, 200.0, 0.0), ParamUnit::Milliseconds),
        ParamDescriptor::new(3, "Sync", ParamRange::stepped(2, 0.0), ParamUnit::Choice(OFF_ON)),
        ParamDescriptor::new(4, "Division", ParamRange::stepped(12, 5.0), ParamUnit::Choice(&Division::LABELS)),
        ParamDescriptor::new(5, "Feedback", ParamRange::linear(0.0, 0.99, 0.4), ParamUnit::Percent),
        ParamDescriptor::new(6, "Ping-Pong", ParamRange::linear(0.0, 1.0, 1.0), ParamUnit::Percent),
        ParamDescriptor::new(7, "FB Highpass", ParamRange::logarithmic(20.0, 2000.0, 80.0), ParamUnit::Hertz),
        ParamDescriptor::new(8, "FB Lowpass", ParamRange::logarithmic(200.0, 20000.0, 8000.0), ParamUnit::Hertz),
        ParamDescriptor::new(9, "Mix", ParamRange::linear(0.0, 1.0, 0.35), ParamUnit::Percent),
    ];

    pub fn new(sample_rate: f64, max_block: usize) -> Self {
        Self {
            params: ParamSet::new(&Self::DESCRIPTORS),
            dsp: StereoDelay::new(sample_rate),
            scratch: vec![0.0; max_block],
        }
    }

    pub fn params(&self) -> Arc<ParamSet<10>> {
        Arc::clone(&self.params)
    }

    fn apply_params(&mut self) {
        let p = &self.params;
        self.dsp.set_mode(DelayMode::from_index(p.get_index(Self::MODE)));
        self.dsp.set_time_ms(p.get(Self::TIME_MS));
        self.dsp.set_offset_ms(p.get(Self::OFFSET_MS));
        self.dsp.set_sync(
            p.get_bool(Self::SYNC),
            Division::from_index(p.get_index(Self::DIVISION)),
        );
        self.dsp.set_feedback(p.get(Self::FEEDBACK));
        self.dsp.set_ping_pong(p.get(Self::PING_PONG));
        self.dsp
            .set_feedback_filters(p.get(Self::HP_CUTOFF), p.get(Self::LP_CUTOFF));
        self.dsp.set_mix(p.get(Self::MIX));
    }

    pub fn render(&mut self, ctx: &mut RenderContext) {
        self.apply_params();
        let transport = ctx.transport;
        if let Some(buffer) = &mut ctx.buffer {
            match &mut buffer.right {
                Some(right) => self.dsp.process_block(buffer.left, right, &transport),
                None => {
                    let dsp = &mut self.dsp;
                    process_mono_via(buffer.left, &mut self.scratch, |l, r| {
                        dsp.process_block(l, r, &transport)
                    });
                }
            }
        }
    }

    pub fn initialise(&mut self, sample_rate: f64, max_block: usize) {
        self.dsp.set_sample_rate(sample_rate);
        self.scratch = vec![0.0; max_block];
        self.dsp.reset();
    }

    pub fn reset(&mut self) {
        self.dsp.reset();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHORUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Chorus unit
pub struct ChorusUnit {
    params: Arc<ParamSet<4>>,
    dsp: Chorus,
    scratch: Vec<Sample>,
}

impl ChorusUnit {
    pub const DEPTH: usize = 0;
    pub const RATE: usize = 1;
    pub const WIDTH: usize = 2;
    pub const MIX: usize = 3;

    const DESCRIPTORS: [ParamDescriptor; 4] = [
        ParamDescriptor::new(0, "Depth", ParamRange::linear(0.0, 20.0, 3.0), ParamUnit::Milliseconds),
        ParamDescriptor::new(1, "Rate", ParamRange::logarithmic(0.01, 10.0, 0.8), ParamUnit::Hertz),
        ParamDescriptor::new(2, "Width", ParamRange::linear(0.0, 1.0, 0.5), ParamUnit::Percent),
        ParamDescriptor::new(3, "Mix", ParamRange::linear(0.0, 1.0, 0.5), ParamUnit::Percent),
    ];

    pub fn new(sample_rate: f64, max_block: usize) -> Self {
        Self {
            params: ParamSet::new(&Self::DESCRIPTORS),
            dsp: Chorus::new(sample_rate),
            scratch: vec![0.0; max_block],
        }
    }

    pub fn params(&self) -> Arc<ParamSet<4>> {
        Arc::clone(&self.params)
    }

    fn apply_params(&mut self) {
        let p = &self.params;
        self.dsp.set_depth_ms(p.get(Self::DEPTH));
        self.dsp.set_rate_hz(p.get(Self::RATE));
        self.dsp.set_width(p.get(Self::WIDTH));
        self.dsp.set_mix(p.get(Self::MIX));
    }

    pub fn render(&mut self, ctx: &mut RenderContext) {
        self.apply_params();
        if let Some(buffer) = &mut ctx.buffer {
            match &mut buffer.right {
                Some(right) => self.dsp.process_block(buffer.left, right),
                None => {
                    let dsp = &mut self.dsp;
                    process_mono_via(buffer.left, &mut self.scratch, |l, r| {
                        dsp.process_block(l, r)
                    });
                }
            }
        }
    }

    pub fn initialise(&mut self, sample_rate: f64, max_block: usize) {
        self.dsp.set_sample_rate(sample_rate);
        self.scratch = vec![0.0; max_block];
        self.dsp.reset();
    }

    pub fn reset(&mut self) {
        self.dsp.reset();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REVERB
// ═══════════════════════════════════════════════════════════════════════════════

/// Reverb unit: a thin parameter surface over the fixed algorithmic core
pub struct ReverbUnit {
    params: Arc<ParamSet<5>>,
    dsp: ReverbEngine,
    scratch: Vec<Sample>,
}

impl ReverbUnit {
    pub const ROOM_SIZE: usize = 0;
    pub const DAMPING: usize = 1;
    pub const WIDTH: usize = 2;
    pub const MIX: usize = 3;
    pub const PREDELAY: usize = 4;

    const DESCRIPTORS: [ParamDescriptor; 5] = [
        ParamDescriptor::new(0, "Room Size", ParamRange::linear(0.0, 1.0, 0.5), ParamUnit::Percent),
        ParamDescriptor::new(1, "Damping", ParamRange::linear(0.0, 1.0, 0.5), ParamUnit::Percent),
        ParamDescriptor::new(2, "Width", ParamRange::linear(0.0, 1.0, 1.0), ParamUnit::Percent),
        ParamDescriptor::new(3, "Mix", ParamRange::linear(0.0, 1.0, 0.3), ParamUnit::Percent),
        ParamDescriptor::new(4, "Pre-Delay", ParamRange::linear(0.0, 200.0, 0.0), ParamUnit::Milliseconds),
    ];

    pub fn new(sample_rate: f64, max_block: usize) -> Self {
        Self {
            params: ParamSet::new(&Self::DESCRIPTORS),
            dsp: ReverbEngine::new(sample_rate),
            scratch: vec![0.0; max_block],
        }
    }

    pub fn params(&self) -> Arc<ParamSet<5>> {
        Arc::clone(&self.params)
    }

    fn apply_params(&mut self) {
        let p = &self.params;
        self.dsp.set_room_size(p.get(Self::ROOM_SIZE));
        self.dsp.set_damping(p.get(Self::DAMPING));
        self.dsp.set_width(p.get(Self::WIDTH));
        self.dsp.set_mix(p.get(Self::MIX));
        self.dsp.set_predelay_ms(p.get(Self::PREDELAY));
    }

    pub fn render(&mut self, ctx: &mut RenderContext) {
        self.apply_params();
        if let Some(buffer) = &mut ctx.buffer {
            match &mut buffer.right {
                Some(right) => self.dsp.process_block(buffer.left, right),
                None => {
                    let dsp = &mut self.dsp;
                    process_mono_via(buffer.left, &mut self.scratch, |l, r| {
                        dsp.process_block(l, r)
                    });
                }
            }
        }
    }

    pub fn initialise(&mut self, sample_rate: f64, max_block: usize) {
        self.dsp.set_sample_rate(sample_rate);
        self.scratch = vec![0.0; max_block];
        self.dsp.reset();
    }

    pub fn reset(&mut self) {
        self.dsp.reset();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SATURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Saturation unit
pub struct SaturationUnit {
    params: Arc<ParamSet<8>>,
    dsp: SaturationEngine,
    scratch: Vec<Sample>,
}

impl SaturationUnit {
    pub const CURVE: usize = 0;
    pub const QUALITY: usize = 1;
    pub const DRIVE: usize = 2;
    pub const INPUT_TRIM: usize = 3;
    pub const OUTPUT_TRIM: usize = 4;
    pub const BIAS: usize = 5;
    pub const TONE: usize = 6;
    pub const MIX: usize = 7;

    const DESCRIPTORS: [ParamDescriptor; 8] = [
        ParamDescriptor::new(0, "Curve", ParamRange::stepped(3, 0.0), ParamUnit::Choice(&SaturationCurve::LABELS)),
        ParamDescriptor::new(1, "Quality", ParamRange::stepped(3, 1.0), ParamUnit::Choice(&OversampleFactor::LABELS)),
        ParamDescriptor::new(2, "Drive", ParamRange::linear(0.0, 1.0, 0.3), ParamUnit::Percent),
        ParamDescriptor::new(3, "Input", ParamRange::linear(-24.0, 24.0, 0.0), ParamUnit::Decibels),
        ParamDescriptor::new(4, "Output", ParamRange::linear(-24.0, 24.0, 0.0), ParamUnit::Decibels),
        ParamDescriptor::new(5, "Bias", ParamRange::linear(-0.25, 0.25, 0.0), ParamUnit::Plain),
        ParamDescriptor::new(6, "Tone", ParamRange::logarithmic(500.0, 20000.0, 12000.0), ParamUnit::Hertz),
        ParamDescriptor::new(7, "Mix", ParamRange::linear(0.0, 1.0, 1.0), ParamUnit::Percent),
    ];

    pub fn new(sample_rate: f64, max_block: usize) -> Self {
        Self {
            params: ParamSet::new(&Self::DESCRIPTORS),
            dsp: SaturationEngine::new(sample_rate, max_block),
            scratch: vec![0.0; max_block],
        }
    }

    pub fn params(&self) -> Arc<ParamSet<8>> {
        Arc::clone(&self.params)
    }

    /// UI meter handles (re-acquire after `initialise`)
    pub fn meters(&self) -> (Arc<MeterCell>, Arc<MeterCell>) {
        (self.dsp.input_meter(), self.dsp.output_meter())
    }

    fn apply_params(&mut self) {
        let p = &self.params;
        self.dsp
            .set_curve(SaturationCurve::from_index(p.get_index(Self::CURVE)));
        self.dsp
            .set_quality(OversampleFactor::from_index(p.get_index(Self::QUALITY)));
        self.dsp.set_drive(p.get(Self::DRIVE));
        self.dsp.set_input_trim_db(p.get(Self::INPUT_TRIM));
        self.dsp.set_output_trim_db(p.get(Self::OUTPUT_TRIM));
        self.dsp.set_bias(p.get(Self::BIAS));
        self.dsp.set_tone_hz(p.get(Self::TONE));
        self.dsp.set_mix(p.get(Self::MIX));
    }

    pub fn render(&mut self, ctx: &mut RenderContext) {
        self.apply_params();
        if let Some(buffer) = &mut ctx.buffer {
            match &mut buffer.right {
                Some(right) => self.dsp.process_block(buffer.left, right),
                None => {
                    let dsp = &mut self.dsp;
                    process_mono_via(buffer.left, &mut self.scratch, |l, r| {
                        dsp.process_block(l, r)
                    });
                }
            }
        }
    }

    pub fn initialise(&mut self, sample_rate: f64, max_block: usize) {
        self.dsp = SaturationEngine::new(sample_rate, max_block);
        self.scratch = vec![0.0; max_block];
    }

    pub fn reset(&mut self) {
        self.dsp.reset();
    }

    pub fn latency(&self) -> usize {
        self.dsp.latency()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SPECTRUM
// ═══════════════════════════════════════════════════════════════════════════════

/// Spectrum analyzer unit (audio pass-through, analysis only)
pub struct SpectrumUnit {
    params: Arc<ParamSet<0>>,
    dsp: SpectrumAnalyzer,
}

impl SpectrumUnit {
    const DESCRIPTORS: [ParamDescriptor; 0] = [];

    pub fn new(sample_rate: f64, _max_block: usize) -> Self {
        Self {
            params: ParamSet::new(&Self::DESCRIPTORS),
            dsp: SpectrumAnalyzer::new(sample_rate),
        }
    }

    pub fn params(&self) -> Arc<ParamSet<0>> {
        Arc::clone(&self.params)
    }

    /// UI-side read handle; valid across `initialise` calls
    pub fn reader(&self) -> SpectrumReader {
        self.dsp.reader()
    }

    pub fn render(&mut self, ctx: &mut RenderContext) {
        if let Some(buffer) = &ctx.buffer {
            let left: &[Sample] = &buffer.left[..];
            let right: &[Sample] = match &buffer.right {
                Some(r) => &r[..],
                None => left,
            };
            self.dsp.process_block(left, right);
        }
    }

    pub fn initialise(&mut self, sample_rate: f64, _max_block: usize) {
        self.dsp.set_sample_rate(sample_rate);
        self.dsp.reset();
    }

    pub fn reset(&mut self) {
        self.dsp.reset();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ARPEGGIATOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Arpeggiator unit (event-in, event-out)
pub struct ArpeggiatorUnit {
    params: Arc<ParamSet<4>>,
    dsp: Arpeggiator,
}

impl ArpeggiatorUnit {
    pub const MODE: usize = 0;
    pub const RATE: usize = 1;
    pub const GATE: usize = 2;
    pub const OCTAVES: usize = 3;

    const DESCRIPTORS: [ParamDescriptor; 4] = [
        ParamDescriptor::new(0, "Mode", ParamRange::stepped(4, 0.0), ParamUnit::Choice(&ArpMode::LABELS)),
        ParamDescriptor::new(1, "Rate", ParamRange::stepped(7, 3.0), ParamUnit::Choice(&ArpRate::LABELS)),
        ParamDescriptor::new(2, "Gate", ParamRange::linear(0.1, 1.0, 0.8), ParamUnit::Percent),
        ParamDescriptor::new(3, "Octaves", ParamRange::linear(1.0, 4.0, 1.0), ParamUnit::Plain),
    ];

    pub fn new(sample_rate: f64, _max_block: usize) -> Self {
        Self {
            params: ParamSet::new(&Self::DESCRIPTORS),
            dsp: Arpeggiator::new(sample_rate),
        }
    }

    pub fn params(&self) -> Arc<ParamSet<4>> {
        Arc::clone(&self.params)
    }

    fn apply_params(&mut self) {
        let p = &self.params;
        self.dsp.set_mode(ArpMode::from_index(p.get_index(Self::MODE)));
        self.dsp.set_rate(ArpRate::from_index(p.get_index(Self::RATE)));
        self.dsp.set_gate(p.get(Self::GATE));
        self.dsp.set_octaves(p.get_index(Self::OCTAVES) as u32);
    }

    pub fn render(&mut self, ctx: &mut RenderContext, midi_out: &mut EventSink) {
        self.apply_params();
        self.dsp
            .process(ctx.events, ctx.num_samples, &ctx.transport, midi_out);
    }

    pub fn initialise(&mut self, sample_rate: f64, _max_block: usize) {
        self.dsp.set_sample_rate(sample_rate);
        let mut sink = EventSink::with_capacity(4);
        self.dsp.reset(&mut sink);
    }

    pub fn reset(&mut self, midi_out: &mut EventSink) {
        self.dsp.reset(midi_out);
    }
}
