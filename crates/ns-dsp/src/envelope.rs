//! ADSR envelope generator
//!
//! Linear attack, exponential decay/release. Attack always ramps from the
//! current level so retriggering a sounding voice never clicks. A voice is
//! freed when its amplitude envelope reports idle.

/// Envelope stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeStage {
    #[default]
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Level below which a releasing envelope is considered silent (~ -80 dB)
const IDLE_THRESHOLD: f64 = 1e-4;

/// ADSR envelope
#[derive(Debug, Clone)]
pub struct AdsrEnvelope {
    stage: EnvelopeStage,
    level: f64,
    attack_step: f64,
    decay_coeff: f64,
    sustain: f64,
    release_coeff: f64,
    sample_rate: f64,
}

impl AdsrEnvelope {
    pub fn new(sample_rate: f64) -> Self {
        let mut env = Self {
            stage: EnvelopeStage::Idle,
            level: 0.0,
            attack_step: 0.0,
            decay_coeff: 0.0,
            sustain: 1.0,
            release_coeff: 0.0,
            sample_rate,
        };
        env.set_params(5.0, 100.0, 0.8, 200.0);
        env
    }

    /// Set all four stage parameters. Times in ms (clamped to [0.1, 30000]),
    /// sustain in [0, 1].
    pub fn set_params(&mut self, attack_ms: f64, decay_ms: f64, sustain: f64, release_ms: f64) {
        let attack_samples = (attack_ms.clamp(0.1, 30000.0) / 1000.0) * self.sample_rate;
        self.attack_step = 1.0 / attack_samples.max(1.0);
        self.decay_coeff = Self::stage_coeff(decay_ms, self.sample_rate);
        self.sustain = if sustain.is_finite() {
            sustain.clamp(0.0, 1.0)
        } else {
            1.0
        };
        self.release_coeff = Self::stage_coeff(release_ms, self.sample_rate);
    }

    fn stage_coeff(time_ms: f64, sample_rate: f64) -> f64 {
        let samples = (time_ms.clamp(0.1, 30000.0) / 1000.0) * sample_rate;
        1.0 - (-1.0 / samples.max(1.0)).exp()
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        // Stage rates are re-derived by the next set_params call
        self.sample_rate = sample_rate;
    }

    #[inline]
    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    #[inline]
    pub fn level(&self) -> f64 {
        self.level
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.stage == EnvelopeStage::Idle
    }

    #[inline]
    pub fn is_releasing(&self) -> bool {
        self.stage == EnvelopeStage::Release
    }

    /// Begin the attack stage from the current level
    pub fn note_on(&mut self) {
        self.stage = EnvelopeStage::Attack;
    }

    /// Begin the release stage
    pub fn note_off(&mut self) {
        if self.stage != EnvelopeStage::Idle {
            self.stage = EnvelopeStage::Release;
        }
    }

    /// Advance one sample and return the envelope level
    #[inline]
    pub fn next(&mut self) -> f64 {
        match self.stage {
            EnvelopeStage::Idle => {
                self.level = 0.0;
            }
            EnvelopeStage::Attack => {
                self.level += self.attack_step;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = EnvelopeStage::Decay;
                }
            }
            EnvelopeStage::Decay => {
                self.level += self.decay_coeff * (self.sustain - self.level);
                if (self.level - self.sustain).abs() < 1e-4 {
                    self.stage = EnvelopeStage::Sustain;
                }
            }
            EnvelopeStage::Sustain => {
                self.level = self.sustain;
            }
            EnvelopeStage::Release => {
                self.level -= self.release_coeff * self.level;
                if self.level < IDLE_THRESHOLD {
                    self.level = 0.0;
                    self.stage = EnvelopeStage::Idle;
                }
            }
        }
        self.level
    }

    pub fn reset(&mut self) {
        self.stage = EnvelopeStage::Idle;
        self.level = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_cycle() {
        let mut env = AdsrEnvelope::new(48000.0);
        env.set_params(10.0, 50.0, 0.5, 100.0);
        env.note_on();

        // Attack reaches full scale
        let mut peak: f64 = 0.0;
        for _ in 0..960 {
            peak = peak.max(env.next());
        }
        assert!((peak - 1.0).abs() < 1e-9);

        // Decay settles to sustain
        for _ in 0..48000 {
            env.next();
        }
        assert!((env.level() - 0.5).abs() < 1e-3);
        assert_eq!(env.stage(), EnvelopeStage::Sustain);

        // Release decays to idle
        env.note_off();
        for _ in 0..96000 {
            env.next();
        }
        assert!(env.is_idle());
        assert_eq!(env.level(), 0.0);
    }

    #[test]
    fn test_retrigger_from_current_level() {
        let mut env = AdsrEnvelope::new(48000.0);
        env.set_params(100.0, 50.0, 0.8, 100.0);
        env.note_on();
        for _ in 0..2400 {
            env.next();
        }
        let mid = env.level();
        assert!(mid > 0.0 && mid < 1.0);

        // Retrigger: no discontinuity back to zero
        env.note_on();
        let next = env.next();
        assert!(next >= mid);
    }

    #[test]
    fn test_note_off_while_idle_stays_idle() {
        let mut env = AdsrEnvelope::new(48000.0);
        env.note_off();
        assert!(env.is_idle());
        assert_eq!(env.next(), 0.0);
    }

    #[test]
    fn test_params_clamped() {
        let mut env = AdsrEnvelope::new(48000.0);
        env.set_params(-5.0, 0.0, f64::NAN, 1e12);
        env.note_on();
        for _ in 0..100 {
            assert!(env.next().is_finite());
        }
    }
}
