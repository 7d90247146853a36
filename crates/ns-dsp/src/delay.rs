//! Multi-mode stereo delay with tempo sync and filtered feedback
//!
//! One base delay time (manual ms or tempo-synced musical division) expanded
//! into per-channel times by the stereo mode, with a highpass→lowpass
//! state-variable filter pair in each feedback path. Delay-time changes ride a
//! linear ramp in the samples domain so tempo or parameter jumps never produce
//! zipper or pitch-shift artifacts beyond the ramp slope.

use ns_core::{Division, Sample, Transport};

use crate::filters::{StateVariableFilter, SvfMode};
use crate::smoothing::{SmoothedParam, SmoothingType};
use crate::{Processor, ProcessorConfig};

/// Longest representable delay, covering the parameter range plus sync
/// headroom at slow tempos
pub const MAX_DELAY_MS: f64 = 4000.0;

/// Manual delay-time parameter range
pub const MAX_TIME_MS: f64 = 2000.0;

/// Stereo routing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DelayMode {
    /// L/R summed, one tap, identical output to both channels
    Mono,
    /// Independent L/R delay = base ± offset/2
    #[default]
    Stereo,
    /// Symmetric spread: base ∓ |offset|
    Dual,
    /// Mono input with cross-feedback between the taps
    PingPong,
}

impl DelayMode {
    pub const LABELS: [&'static str; 4] = ["Mono", "Stereo", "Dual", "Ping-Pong"];

    pub fn from_index(index: usize) -> Self {
        match index {
            0 => Self::Mono,
            1 => Self::Stereo,
            2 => Self::Dual,
            _ => Self::PingPong,
        }
    }
}

/// Multi-mode stereo delay
#[derive(Debug)]
pub struct StereoDelay {
    buffer_l: Vec<Sample>,
    buffer_r: Vec<Sample>,
    write_pos: usize,
    max_delay_samples: usize,

    /// Smoothed base delay in samples
    time_smooth: SmoothedParam,
    time_ms: f64,
    offset_ms: f64,
    mode: DelayMode,
    sync_enabled: bool,
    division: Division,

    feedback: f64,
    ping_pong: f64,
    mix: SmoothedParam,

    hp_cutoff: f64,
    lp_cutoff: f64,
    hp_l: StateVariableFilter,
    hp_r: StateVariableFilter,
    lp_l: StateVariableFilter,
    lp_r: StateVariableFilter,

    sample_rate: f64,
}

impl StereoDelay {
    pub fn new(sample_rate: f64) -> Self {
        let max_delay_samples = (MAX_DELAY_MS * 0.001 * sample_rate) as usize;
        let default_samples = 500.0 * 0.001 * sample_rate;

        let mut delay = Self {
            buffer_l: vec![0.0; max_delay_samples],
            buffer_r: vec![0.0; max_delay_samples],
            write_pos: 0,
            max_delay_samples,
            time_smooth: SmoothedParam::new(
                default_samples,
                100.0,
                sample_rate,
                SmoothingType::Linear,
            ),
            time_ms: 500.0,
            offset_ms: 0.0,
            mode: DelayMode::Stereo,
            sync_enabled: false,
            division: Division::Quarter,
            feedback: 0.4,
            ping_pong: 1.0,
            mix: SmoothedParam::new(0.35, 20.0, sample_rate, SmoothingType::Exponential),
            hp_cutoff: 80.0,
            lp_cutoff: 8000.0,
            hp_l: StateVariableFilter::new(sample_rate),
            hp_r: StateVariableFilter::new(sample_rate),
            lp_l: StateVariableFilter::new(sample_rate),
            lp_r: StateVariableFilter::new(sample_rate),
            sample_rate,
        };
        delay.hp_l.set_mode(SvfMode::Highpass);
        delay.hp_r.set_mode(SvfMode::Highpass);
        delay.lp_l.set_mode(SvfMode::Lowpass);
        delay.lp_r.set_mode(SvfMode::Lowpass);
        delay.apply_filter_cutoffs();
        delay
    }

    pub fn set_mode(&mut self, mode: DelayMode) {
        self.mode = mode;
    }

    pub fn set_time_ms(&mut self, ms: f64) {
        self.time_ms = if ms.is_finite() {
            ms.clamp(1.0, MAX_TIME_MS)
        } else {
            500.0
        };
    }

    /// Stereo offset between the channel delay times, in ms
    pub fn set_offset_ms(&mut self, ms: f64) {
        self.offset_ms = if ms.is_finite() {
            ms.clamp(-200.0, 200.0)
        } else {
            0.0
        };
    }

    pub fn set_sync(&mut self, enabled: bool, division: Division) {
        self.sync_enabled = enabled;
        self.division = division;
    }

    pub fn set_feedback(&mut self, feedback: f64) {
        self.feedback = feedback.clamp(0.0, 0.99);
    }

    /// Cross-feedback blend for ping-pong mode: 0 = stereo, 1 = fully
    /// alternating
    pub fn set_ping_pong(&mut self, amount: f64) {
        self.ping_pong = amount.clamp(0.0, 1.0);
    }

    pub fn set_mix(&mut self, mix: f64) {
        self.mix.set_target(mix.clamp(0.0, 1.0));
    }

    /// Feedback tone filters. The lowpass floor sits 10 Hz above the highpass
    /// so the pair always stays stable.
    pub fn set_feedback_filters(&mut self, hp_hz: f64, lp_hz: f64) {
        self.hp_cutoff = hp_hz.clamp(20.0, 2000.0);
        self.lp_cutoff = lp_hz.clamp(200.0, 20000.0);
        self.apply_filter_cutoffs();
    }

    fn apply_filter_cutoffs(&mut self) {
        let lp = self.lp_cutoff.max(self.hp_cutoff + 10.0);
        self.hp_l.set_cutoff(self.hp_cutoff);
        self.hp_r.set_cutoff(self.hp_cutoff);
        self.lp_l.set_cutoff(lp);
        self.lp_r.set_cutoff(lp);
    }

    /// Current smoothed base delay in samples (for tests/UI)
    pub fn current_delay_samples(&self) -> f64 {
        self.time_smooth.current()
    }

    /// Maximum per-sample slope of the active delay-time ramp
    pub fn max_ramp_step(&self) -> f64 {
        self.time_smooth.max_step()
    }

    #[inline]
    fn read_interpolated(buffer: &[Sample], pos: f64, max_samples: usize) -> f64 {
        let pos = pos.rem_euclid(max_samples as f64);
        let index = pos as usize;
        let frac = pos - index as f64;
        let s0 = buffer[index % max_samples] as f64;
        let s1 = buffer[(index + 1) % max_samples] as f64;
        s0 + (s1 - s0) * frac
    }

    /// Clamp a per-channel delay into `[1, max_delay_samples - 1]`
    #[inline]
    fn clamp_delay(&self, samples: f64) -> f64 {
        samples.clamp(1.0, (self.max_delay_samples - 1) as f64)
    }

    /// Process a stereo block. The transport supplies the tempo used when
    /// sync is enabled.
    pub fn process_block(&mut self, left: &mut [Sample], right: &mut [Sample], transport: &Transport) {
        let n = left.len().min(right.len());
        if n == 0 {
            return;
        }

        // Derive the target base time once per block, then ramp toward it.
        // Only retarget on an actual change so the linear ramp runs to
        // completion instead of being re-armed every block.
        let target_ms = if self.sync_enabled {
            self.division.ms_at(transport.tempo()).min(MAX_DELAY_MS - 250.0)
        } else {
            self.time_ms
        };
        let target_samples = target_ms * 0.001 * self.sample_rate;
        if (self.time_smooth.target() - target_samples).abs() > 1e-9 {
            self.time_smooth.set_target(target_samples);
        }

        let offset_samples = self.offset_ms * 0.001 * self.sample_rate;

        for i in 0..n {
            let base = self.time_smooth.next();

            let (delay_l, delay_r) = match self.mode {
                DelayMode::Mono | DelayMode::PingPong => {
                    let d = self.clamp_delay(base);
                    (d, d)
                }
                DelayMode::Stereo => (
                    self.clamp_delay(base + offset_samples * 0.5),
                    self.clamp_delay(base - offset_samples * 0.5),
                ),
                DelayMode::Dual => (
                    self.clamp_delay(base - offset_samples.abs()),
                    self.clamp_delay(base + offset_samples.abs()),
                ),
            };

            let in_l = left[i] as f64;
            let in_r = right[i] as f64;

            // Read the wet taps first: feedback must see the previous
            // block's contribution, not the value written this sample
            let read_l = self.write_pos as f64 + self.max_delay_samples as f64 - delay_l;
            let read_r = self.write_pos as f64 + self.max_delay_samples as f64 - delay_r;
            let wet_l = Self::read_interpolated(&self.buffer_l, read_l, self.max_delay_samples);
            let wet_r = Self::read_interpolated(&self.buffer_r, read_r, self.max_delay_samples);

            // Feedback tone shaping: highpass then lowpass
            let fb_l = self.lp_l.process_f64(self.hp_l.process_f64(wet_l));
            let fb_r = self.lp_r.process_f64(self.hp_r.process_f64(wet_r));

            let (write_l, write_r) = match self.mode {
                DelayMode::Mono => {
                    let mono = (in_l + in_r) * 0.5;
                    let w = mono + fb_l * self.feedback;
                    (w, w)
                }
                DelayMode::Stereo | DelayMode::Dual => (
                    in_l + fb_l * self.feedback,
                    in_r + fb_r * self.feedback,
                ),
                DelayMode::PingPong => {
                    let mono = (in_l + in_r) * 0.5;
                    let pp = self.ping_pong;
                    let cross_l = fb_l * (1.0 - pp) + fb_r * pp;
                    let cross_r = fb_r * (1.0 - pp) + fb_l * pp;
                    (
                        mono + cross_l * self.feedback,
                        mono * (1.0 - pp) + cross_r * self.feedback,
                    )
                }
            };

            self.buffer_l[self.write_pos] = write_l as Sample;
            self.buffer_r[self.write_pos] = write_r as Sample;
            self.write_pos = (self.write_pos + 1) % self.max_delay_samples;

            let mix = self.mix.next();
            left[i] = (in_l * (1.0 - mix) + wet_l * mix) as Sample;
            right[i] = (in_r * (1.0 - mix) + wet_r * mix) as Sample;
        }

        self.hp_l.flush();
        self.hp_r.flush();
        self.lp_l.flush();
        self.lp_r.flush();
    }
}

impl Processor for StereoDelay {
    fn reset(&mut self) {
        self.buffer_l.fill(0.0);
        self.buffer_r.fill(0.0);
        self.write_pos = 0;
        self.hp_l.reset();
        self.hp_r.reset();
        self.lp_l.reset();
        self.lp_r.reset();
        self.time_smooth.reset();
        self.mix.reset();
    }
}

impl ProcessorConfig for StereoDelay {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        let ratio = sample_rate / self.sample_rate;
        self.sample_rate = sample_rate;
        self.max_delay_samples = (self.max_delay_samples as f64 * ratio) as usize;
        self.buffer_l = vec![0.0; self.max_delay_samples];
        self.buffer_r = vec![0.0; self.max_delay_samples];
        self.write_pos = 0;
        self.time_smooth.set_sample_rate(sample_rate);
        self.time_smooth
            .set_immediate(self.time_ms * 0.001 * sample_rate);
        self.mix.set_sample_rate(sample_rate);
        for f in [&mut self.hp_l, &mut self.hp_r, &mut self.lp_l, &mut self.lp_r] {
            f.set_sample_rate(sample_rate);
        }
        self.apply_filter_cutoffs();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 48000.0;

    fn run(delay: &mut StereoDelay, l: &mut [Sample], r: &mut [Sample]) {
        let t = Transport::stopped(120.0);
        delay.process_block(l, r, &t);
    }

    #[test]
    fn test_impulse_returns_after_delay_time() {
        let mut delay = StereoDelay::new(SR);
        delay.set_mode(DelayMode::Mono);
        delay.set_time_ms(100.0);
        delay.set_offset_ms(0.0);
        delay.set_feedback(0.0);
        delay.set_mix(1.0);
        // Settle the smoothers before the impulse
        let mut warm = vec![0.0; 9600];
        run(&mut delay, &mut warm.clone(), &mut warm);

        let delay_samples = (100.0 * 0.001 * SR) as usize;
        let mut l = vec![0.0; delay_samples + 256];
        let mut r = vec![0.0; delay_samples + 256];
        l[0] = 1.0;
        r[0] = 1.0;
        run(&mut delay, &mut l, &mut r);

        let peak_at = l
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.abs().partial_cmp(&b.1.abs()).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert!(
            (peak_at as i64 - delay_samples as i64).abs() <= 2,
            "peak at {} expected {}",
            peak_at,
            delay_samples
        );
    }

    #[test]
    fn test_sync_quarter_at_120_bpm_is_500ms() {
        let mut delay = StereoDelay::new(SR);
        delay.set_sync(true, Division::Quarter);
        let t = Transport {
            playing: true,
            tempo_bpm: 120.0,
            beat_start: 0.0,
            beat_end: 1.0,
        };
        // Let the ramp settle on the sync target
        for _ in 0..40 {
            let mut l = vec![0.0; 512];
            let mut r = vec![0.0; 512];
            delay.process_block(&mut l, &mut r, &t);
        }
        let expected = 0.5 * SR;
        assert!(
            (delay.current_delay_samples() - expected).abs() < 1.0,
            "delay {} expected {}",
            delay.current_delay_samples(),
            expected
        );
    }

    #[test]
    fn test_tempo_change_bounded_by_ramp() {
        let mut delay = StereoDelay::new(SR);
        delay.set_sync(true, Division::Quarter);
        let mut t = Transport {
            playing: true,
            tempo_bpm: 120.0,
            beat_start: 0.0,
            beat_end: 1.0,
        };
        for _ in 0..40 {
            let mut l = vec![0.0; 512];
            let mut r = vec![0.0; 512];
            delay.process_block(&mut l, &mut r, &t);
        }
        // Jump to 90 BPM and watch the per-block movement of the base time
        t.tempo_bpm = 90.0;
        let mut prev = delay.current_delay_samples();
        for _ in 0..40 {
            let mut l = vec![0.0; 512];
            let mut r = vec![0.0; 512];
            delay.process_block(&mut l, &mut r, &t);
            let now = delay.current_delay_samples();
            // 100 ms ramp: at most |target step| / (0.1 * SR) per sample
            let bound = 512.0 * ((2.0 / 3.0 - 0.5) * SR).abs() / (0.1 * SR) + 1.0;
            assert!((now - prev).abs() <= bound);
            prev = now;
        }
        assert!((delay.current_delay_samples() - (2.0 / 3.0) * SR).abs() < 1.0);
    }

    #[test]
    fn test_ping_pong_alternates_channels() {
        let mut delay = StereoDelay::new(SR);
        delay.set_mode(DelayMode::PingPong);
        delay.set_time_ms(50.0);
        delay.set_feedback(0.9);
        delay.set_ping_pong(1.0);
        delay.set_mix(1.0);
        let mut warm_l = vec![0.0; 9600];
        let mut warm_r = vec![0.0; 9600];
        run(&mut delay, &mut warm_l, &mut warm_r);

        let d = (50.0 * 0.001 * SR) as usize;
        let mut l = vec![0.0; d * 3];
        let mut r = vec![0.0; d * 3];
        l[0] = 1.0;
        r[0] = 1.0;
        run(&mut delay, &mut l, &mut r);

        // First echo lands on the left tap, second on the right
        let first_l = l[d - 2..d + 2].iter().fold(0.0f32, |m, &x| m.max(x.abs()));
        let first_r = r[d - 2..d + 2].iter().fold(0.0f32, |m, &x| m.max(x.abs()));
        let second_l = l[2 * d - 2..2 * d + 2].iter().fold(0.0f32, |m, &x| m.max(x.abs()));
        let second_r = r[2 * d - 2..2 * d + 2].iter().fold(0.0f32, |m, &x| m.max(x.abs()));
        assert!(first_l > 0.2 && first_r < 0.05, "first echo L {} R {}", first_l, first_r);
        assert!(second_r > 0.1 && second_l < 0.05, "second echo L {} R {}", second_l, second_r);
    }

    #[test]
    fn test_reset_then_silence_is_silent() {
        let mut delay = StereoDelay::new(SR);
        delay.set_feedback(0.8);
        delay.set_mix(0.5);
        let mut l: Vec<Sample> = (0..4096).map(|i| ((i as f32) * 0.01).sin()).collect();
        let mut r = l.clone();
        run(&mut delay, &mut l, &mut r);

        delay.reset();
        let mut l = vec![0.0; 4096];
        let mut r = vec![0.0; 4096];
        run(&mut delay, &mut l, &mut r);
        assert!(l.iter().chain(r.iter()).all(|&x| x.abs() < 1e-9));
    }

    #[test]
    fn test_lowpass_floor_above_highpass() {
        let mut delay = StereoDelay::new(SR);
        // Degenerate request: LP below HP must not destabilize the feedback
        delay.set_feedback_filters(2000.0, 200.0);
        delay.set_feedback(0.95);
        delay.set_mix(1.0);
        let mut l: Vec<Sample> = (0..48000).map(|i| ((i as f32) * 0.3).sin() * 0.5).collect();
        let mut r = l.clone();
        run(&mut delay, &mut l, &mut r);
        assert!(l.iter().chain(r.iter()).all(|x| x.is_finite()));
    }
}
