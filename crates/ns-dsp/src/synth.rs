//! Polyphonic voice engine
//!
//! Converts note events plus continuous parameters into a stereo signal:
//! band-limited oscillators, dual ADSR envelopes (amplitude, filter), a
//! per-voice ladder or state-variable filter, and unison with detune/pan
//! spread. Voices come from a fixed pool; exhaustion is resolved by stealing,
//! never by failure.

use ns_core::{Sample, TimedEvent, NoteEvent, note_to_frequency};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::{FRAC_PI_4, TAU};

use crate::envelope::AdsrEnvelope;
use crate::filters::{LadderFilter, StateVariableFilter, SvfMode};
use crate::oscillator::{BlepOscillator, Waveform};
use crate::smoothing::{SmoothedParam, SmoothingType};
use crate::{Processor, ProcessorConfig};

/// Fixed voice pool size
pub const MAX_VOICES: usize = 32;

/// Maximum unison order
pub const MAX_UNISON: usize = 5;

/// Per-voice filter topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceFilterMode {
    /// 24 dB/oct ladder
    #[default]
    Ladder,
    /// 12 dB/oct state-variable lowpass
    Svf,
}

impl VoiceFilterMode {
    pub const LABELS: [&'static str; 2] = ["Ladder 24dB", "SVF 12dB"];

    pub fn from_index(index: usize) -> Self {
        match index {
            0 => Self::Ladder,
            _ => Self::Svf,
        }
    }
}

/// One sounding note
#[derive(Debug, Clone)]
struct Voice {
    active: bool,
    note: u8,
    velocity: f64,
    osc: BlepOscillator,
    amp_env: AdsrEnvelope,
    filter_env: AdsrEnvelope,
    ladder: LadderFilter,
    svf: StateVariableFilter,
    /// Symmetric unison bias in [-1, +1]: drives pan and detune spread
    bias: f64,
    /// Note-on order stamp for steal ordering
    started_at: u64,
}

impl Voice {
    fn new(sample_rate: f64) -> Self {
        let mut svf = StateVariableFilter::new(sample_rate);
        svf.set_mode(SvfMode::Lowpass);
        Self {
            active: false,
            note: 0,
            velocity: 0.0,
            osc: BlepOscillator::new(Waveform::Saw),
            amp_env: AdsrEnvelope::new(sample_rate),
            filter_env: AdsrEnvelope::new(sample_rate),
            ladder: LadderFilter::new(sample_rate),
            svf,
            bias: 0.0,
            started_at: 0,
        }
    }
}

/// Polyphonic synthesizer engine
#[derive(Debug)]
pub struct SynthEngine {
    voices: Vec<Voice>,

    // Oscillator / unison
    waveform: Waveform,
    tuning_cents: f64,
    unison_order: usize,
    unison_detune_cents: f64,
    unison_spread: f64,
    retrigger: bool,

    // Filter
    filter_mode: VoiceFilterMode,
    cutoff_hz: f64,
    resonance: f64,
    /// Filter-envelope sweep in semitones, [-60, +60]
    env_amount_semis: f64,

    // Envelope settings applied to newly allocated voices
    amp_adsr: (f64, f64, f64, f64),
    filter_adsr: (f64, f64, f64, f64),

    master_gain: SmoothedParam,
    note_counter: u64,
    rng: SmallRng,
    sample_rate: f64,
}

impl SynthEngine {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            voices: (0..MAX_VOICES).map(|_| Voice::new(sample_rate)).collect(),
            waveform: Waveform::Saw,
            tuning_cents: 0.0,
            unison_order: 1,
            unison_detune_cents: 10.0,
            unison_spread: 0.5,
            retrigger: false,
            filter_mode: VoiceFilterMode::Ladder,
            cutoff_hz: 8000.0,
            resonance: 0.1,
            env_amount_semis: 24.0,
            amp_adsr: (5.0, 100.0, 0.8, 200.0),
            filter_adsr: (5.0, 150.0, 0.3, 200.0),
            master_gain: SmoothedParam::new(0.7, 20.0, sample_rate, SmoothingType::Exponential),
            note_counter: 0,
            rng: SmallRng::seed_from_u64(0x4E53_5359_4E54_4831),
            sample_rate,
        }
    }

    // ---- Parameter setters (clamped at every call) ----

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    pub fn set_tuning_cents(&mut self, cents: f64) {
        self.tuning_cents = if cents.is_finite() {
            cents.clamp(-1200.0, 1200.0)
        } else {
            0.0
        };
    }

    pub fn set_unison(&mut self, order: usize, detune_cents: f64, spread: f64) {
        self.unison_order = order.clamp(1, MAX_UNISON);
        self.unison_detune_cents = detune_cents.clamp(0.0, 100.0);
        self.unison_spread = spread.clamp(0.0, 1.0);
    }

    pub fn set_retrigger(&mut self, retrigger: bool) {
        self.retrigger = retrigger;
    }

    pub fn set_filter_mode(&mut self, mode: VoiceFilterMode) {
        self.filter_mode = mode;
    }

    pub fn set_cutoff(&mut self, hz: f64) {
        self.cutoff_hz = if hz.is_finite() {
            hz.clamp(20.0, 20000.0)
        } else {
            8000.0
        };
    }

    pub fn set_resonance(&mut self, resonance: f64) {
        self.resonance = resonance.clamp(0.0, 1.0);
    }

    pub fn set_env_amount(&mut self, semitones: f64) {
        self.env_amount_semis = if semitones.is_finite() {
            semitones.clamp(-60.0, 60.0)
        } else {
            0.0
        };
    }

    pub fn set_amp_adsr(&mut self, attack_ms: f64, decay_ms: f64, sustain: f64, release_ms: f64) {
        self.amp_adsr = (attack_ms, decay_ms, sustain, release_ms);
        for v in self.voices.iter_mut().filter(|v| v.active) {
            v.amp_env.set_params(attack_ms, decay_ms, sustain, release_ms);
        }
    }

    pub fn set_filter_adsr(&mut self, attack_ms: f64, decay_ms: f64, sustain: f64, release_ms: f64) {
        self.filter_adsr = (attack_ms, decay_ms, sustain, release_ms);
        for v in self.voices.iter_mut().filter(|v| v.active) {
            v.filter_env.set_params(attack_ms, decay_ms, sustain, release_ms);
        }
    }

    /// Master output gain, linear [0, 2]
    pub fn set_master_gain(&mut self, gain: f64) {
        self.master_gain.set_target(gain.clamp(0.0, 2.0));
    }

    // ---- Note handling ----

    /// Allocate `unison_order` voices for a note, stealing when the pool is
    /// exhausted. Stealing prefers releasing voices (oldest first), then the
    /// globally oldest voice; it always resolves.
    pub fn note_on(&mut self, note: u8, velocity: u8) {
        let order = self.unison_order.clamp(1, MAX_UNISON);
        let velocity = (velocity.min(127) as f64) / 127.0;

        for k in 0..order {
            let bias = if order == 1 {
                0.0
            } else {
                -1.0 + 2.0 * k as f64 / (order - 1) as f64
            };
            let index = self.find_voice();
            self.note_counter += 1;
            let stamp = self.note_counter;
            let phase = if self.retrigger {
                0.0
            } else {
                // Randomized phase decorrelates unison voices and repeated
                // notes, avoiding phase-cancellation artifacts
                self.rng.random::<f64>() * TAU
            };

            let (aa, ad, asus, ar) = self.amp_adsr;
            let (fa, fd, fsus, fr) = self.filter_adsr;
            let voice = &mut self.voices[index];
            voice.active = true;
            voice.note = note.min(127);
            voice.velocity = velocity;
            voice.bias = bias;
            voice.started_at = stamp;
            voice.osc.set_waveform(self.waveform);
            voice.osc.set_phase(phase);
            voice.amp_env.reset();
            voice.filter_env.reset();
            voice.amp_env.set_params(aa, ad, asus, ar);
            voice.filter_env.set_params(fa, fd, fsus, fr);
            voice.amp_env.note_on();
            voice.filter_env.note_on();
            voice.ladder.reset();
            voice.svf.reset();
        }
    }

    /// Release every voice playing `note`
    pub fn note_off(&mut self, note: u8) {
        for voice in self.voices.iter_mut() {
            if voice.active && voice.note == note {
                voice.amp_env.note_off();
                voice.filter_env.note_off();
            }
        }
    }

    /// Force-release every voice
    pub fn all_notes_off(&mut self) {
        for voice in self.voices.iter_mut() {
            if voice.active {
                voice.amp_env.note_off();
                voice.filter_env.note_off();
            }
        }
    }

    fn find_voice(&self) -> usize {
        // Free voice first
        if let Some(index) = self.voices.iter().position(|v| !v.active) {
            return index;
        }

        // Steal: releasing voices ordered by age, else the globally oldest
        let mut best: Option<(usize, u64)> = None;
        for (i, v) in self.voices.iter().enumerate() {
            if v.amp_env.is_releasing() {
                match best {
                    Some((_, stamp)) if v.started_at >= stamp => {}
                    _ => best = Some((i, v.started_at)),
                }
            }
        }
        if let Some((index, _)) = best {
            return index;
        }

        self.voices
            .iter()
            .enumerate()
            .min_by_key(|(_, v)| v.started_at)
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    /// Number of currently sounding voices
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.active).count()
    }

    // ---- Rendering ----

    /// Render into stereo buffers, adding to their contents. Events are
    /// applied at their sample offsets within the block.
    pub fn render(&mut self, left: &mut [Sample], right: &mut [Sample], events: &[TimedEvent]) {
        let n = left.len().min(right.len());
        if n == 0 {
            // Still honor events that arrived with an empty buffer
            for e in events {
                self.handle_event(e.event);
            }
            return;
        }

        self.update_voice_frequencies();

        let order = self.unison_order.clamp(1, MAX_UNISON);
        let unison_norm = 1.0 / (order as f64).sqrt();

        let mut ev = 0;
        for i in 0..n {
            while ev < events.len() && events[ev].offset as usize <= i {
                self.handle_event(events[ev].event);
                if matches!(events[ev].event, NoteEvent::NoteOn { .. }) {
                    // New voices need their frequency before they sound
                    self.update_voice_frequencies();
                }
                ev += 1;
            }

            let (l, r) = self.render_sample();
            let gain = self.master_gain.next() * unison_norm;
            left[i] += (l * gain) as Sample;
            right[i] += (r * gain) as Sample;
        }

        // Events stamped past the end of the block apply now
        for e in &events[ev..] {
            self.handle_event(e.event);
        }

        // Denormal flush after processing
        for voice in self.voices.iter_mut().filter(|v| v.active) {
            voice.ladder.flush();
            voice.svf.flush();
        }
    }

    fn handle_event(&mut self, event: NoteEvent) {
        match event {
            NoteEvent::NoteOn { note, velocity } => {
                if velocity == 0 {
                    self.note_off(note);
                } else {
                    self.note_on(note, velocity);
                }
            }
            NoteEvent::NoteOff { note } => self.note_off(note),
            NoteEvent::AllNotesOff => self.all_notes_off(),
        }
    }

    /// Re-derive each active voice's oscillator frequency from its note,
    /// global tuning, and unison detune. Called at block rate so tuning
    /// changes take effect without retriggering.
    fn update_voice_frequencies(&mut self) {
        for voice in self.voices.iter_mut().filter(|v| v.active) {
            let cents = self.tuning_cents + voice.bias * self.unison_detune_cents;
            let freq = note_to_frequency(voice.note, cents);
            voice.osc.set_frequency(freq, self.sample_rate);
            voice.osc.set_waveform(self.waveform);
        }
    }

    #[inline]
    fn render_sample(&mut self) -> (f64, f64) {
        let mut left = 0.0;
        let mut right = 0.0;

        for voice in self.voices.iter_mut() {
            if !voice.active {
                continue;
            }

            let amp = voice.amp_env.next();
            if voice.amp_env.is_idle() {
                voice.active = false;
                continue;
            }

            // Filter-envelope cutoff sweep, logarithmic in semitones
            let fenv = voice.filter_env.next();
            let cutoff = (self.cutoff_hz * ((fenv * self.env_amount_semis) / 12.0).exp2())
                .clamp(20.0, 20000.0);

            let raw = voice.osc.next_sample();
            let filtered = match self.filter_mode {
                VoiceFilterMode::Ladder => {
                    voice.ladder.set_cutoff(cutoff);
                    voice.ladder.set_resonance(self.resonance);
                    voice.ladder.process_f64(raw)
                }
                VoiceFilterMode::Svf => {
                    voice.svf.set_cutoff(cutoff);
                    voice.svf.set_resonance(self.resonance);
                    voice.svf.process_f64(raw)
                }
            };

            let sample = filtered * amp * voice.velocity;

            // Constant-power pan from the unison bias
            let pan = (voice.bias * self.unison_spread).clamp(-1.0, 1.0);
            let angle = (pan + 1.0) * FRAC_PI_4;
            left += sample * angle.cos();
            right += sample * angle.sin();
        }

        (left, right)
    }
}

impl Processor for SynthEngine {
    fn reset(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.active = false;
            voice.amp_env.reset();
            voice.filter_env.reset();
            voice.ladder.reset();
            voice.svf.reset();
            voice.osc.reset();
        }
        self.master_gain.reset();
    }
}

impl ProcessorConfig for SynthEngine {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.master_gain.set_sample_rate(sample_rate);
        let (aa, ad, asus, ar) = self.amp_adsr;
        let (fa, fd, fsus, fr) = self.filter_adsr;
        for voice in self.voices.iter_mut() {
            voice.amp_env.set_sample_rate(sample_rate);
            voice.filter_env.set_sample_rate(sample_rate);
            voice.amp_env.set_params(aa, ad, asus, ar);
            voice.filter_env.set_params(fa, fd, fsus, fr);
            voice.ladder.set_sample_rate(sample_rate);
            voice.svf.set_sample_rate(sample_rate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 48000.0;

    fn render_blocks(synth: &mut SynthEngine, blocks: usize, size: usize) -> (Vec<Sample>, Vec<Sample>) {
        let mut all_l = Vec::new();
        let mut all_r = Vec::new();
        for _ in 0..blocks {
            let mut l = vec![0.0; size];
            let mut r = vec![0.0; size];
            synth.render(&mut l, &mut r, &[]);
            all_l.extend_from_slice(&l);
            all_r.extend_from_slice(&r);
        }
        (all_l, all_r)
    }

    #[test]
    fn test_note_produces_sound() {
        let mut synth = SynthEngine::new(SR);
        synth.note_on(60, 100);
        let (l, r) = render_blocks(&mut synth, 4, 512);
        let peak = l.iter().chain(r.iter()).fold(0.0f32, |m, &x| m.max(x.abs()));
        assert!(peak > 0.01, "peak {}", peak);
    }

    #[test]
    fn test_note_off_decays_to_silence() {
        let mut synth = SynthEngine::new(SR);
        synth.set_amp_adsr(1.0, 10.0, 0.8, 20.0);
        synth.note_on(60, 100);
        render_blocks(&mut synth, 4, 512);
        synth.note_off(60);
        // 20ms release → by 500ms everything is idle
        render_blocks(&mut synth, 47, 512);
        assert_eq!(synth.active_voices(), 0);
        let (l, _) = render_blocks(&mut synth, 1, 512);
        assert!(l.iter().all(|&x| x.abs() < 1e-6));
    }

    #[test]
    fn test_voice_pool_bounded_under_flood() {
        let mut synth = SynthEngine::new(SR);
        synth.set_unison(5, 20.0, 1.0);
        for note in 0..120u8 {
            synth.note_on(note, 100);
        }
        assert!(synth.active_voices() <= MAX_VOICES);
        let (l, r) = render_blocks(&mut synth, 4, 512);
        assert!(l.iter().chain(r.iter()).all(|x| x.is_finite()));
    }

    #[test]
    fn test_steal_prefers_releasing_voices() {
        let mut synth = SynthEngine::new(SR);
        synth.set_amp_adsr(1.0, 10.0, 0.8, 5000.0);
        // Fill the pool
        for note in 0..MAX_VOICES as u8 {
            synth.note_on(36 + note, 100);
        }
        assert_eq!(synth.active_voices(), MAX_VOICES);
        // Release one note; its voice should be the one stolen next
        synth.note_off(36);
        render_blocks(&mut synth, 1, 64);
        synth.note_on(100, 100);
        let held: usize = (1..MAX_VOICES as u8)
            .filter(|&n| synth.voices.iter().any(|v| v.active && v.note == 36 + n))
            .count();
        assert_eq!(held, MAX_VOICES - 1, "a held voice was stolen");
        assert!(synth.voices.iter().any(|v| v.active && v.note == 100));
    }

    #[test]
    fn test_unison_spread_widens_stereo() {
        let mut synth = SynthEngine::new(SR);
        synth.set_retrigger(true);
        synth.set_unison(5, 15.0, 1.0);
        synth.note_on(57, 100);
        let (l, r) = render_blocks(&mut synth, 8, 512);
        let diff: f64 = l
            .iter()
            .zip(&r)
            .map(|(&a, &b)| ((a - b) as f64).abs())
            .sum::<f64>()
            / l.len() as f64;
        assert!(diff > 1e-4, "stereo diff {}", diff);
    }

    #[test]
    fn test_sample_accurate_note_on_offset() {
        let mut synth = SynthEngine::new(SR);
        synth.set_amp_adsr(0.1, 10.0, 1.0, 50.0);
        let mut l = vec![0.0; 512];
        let mut r = vec![0.0; 512];
        let events = [TimedEvent::new(
            256,
            NoteEvent::NoteOn {
                note: 69,
                velocity: 127,
            },
        )];
        synth.render(&mut l, &mut r, &events);
        assert!(l[..256].iter().all(|&x| x == 0.0));
        assert!(l[256..].iter().any(|&x| x.abs() > 0.0));
    }

    #[test]
    fn test_render_zero_samples_is_noop() {
        let mut synth = SynthEngine::new(SR);
        let mut l: Vec<Sample> = vec![];
        let mut r: Vec<Sample> = vec![];
        synth.render(&mut l, &mut r, &[]);
    }

    #[test]
    fn test_reset_silences_everything() {
        let mut synth = SynthEngine::new(SR);
        synth.note_on(60, 127);
        render_blocks(&mut synth, 2, 256);
        synth.reset();
        assert_eq!(synth.active_voices(), 0);
        let (l, _) = render_blocks(&mut synth, 1, 256);
        assert!(l.iter().all(|&x| x == 0.0));
    }
}
