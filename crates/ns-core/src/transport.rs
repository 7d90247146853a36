//! Host transport snapshot and musical time divisions

use serde::{Deserialize, Serialize};

/// Legal host tempo range; consumers clamp before use.
pub const MIN_TEMPO_BPM: f64 = 20.0;
pub const MAX_TEMPO_BPM: f64 = 999.0;

/// Per-block snapshot of the host transport
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transport {
    /// Whether the host transport is rolling
    pub playing: bool,
    /// Current tempo in beats per minute
    pub tempo_bpm: f64,
    /// Musical time at the start of this block, in quarter-note beats
    pub beat_start: f64,
    /// Musical time at the end of this block
    pub beat_end: f64,
}

impl Transport {
    pub fn stopped(tempo_bpm: f64) -> Self {
        Self {
            playing: false,
            tempo_bpm,
            beat_start: 0.0,
            beat_end: 0.0,
        }
    }

    /// Tempo clamped to the legal range
    #[inline]
    pub fn tempo(&self) -> f64 {
        if self.tempo_bpm.is_finite() {
            self.tempo_bpm.clamp(MIN_TEMPO_BPM, MAX_TEMPO_BPM)
        } else {
            120.0
        }
    }

    /// Beats elapsed per sample at the current tempo
    #[inline]
    pub fn beats_per_sample(&self, sample_rate: f64) -> f64 {
        self.tempo() / 60.0 / sample_rate
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::stopped(120.0)
    }
}

/// Musical delay-sync division: whole notes down to sixteenth-note triplets,
/// with dotted and triplet variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum Division {
    Whole,
    HalfDotted,
    Half,
    HalfTriplet,
    QuarterDotted,
    #[default]
    Quarter,
    QuarterTriplet,
    EighthDotted,
    Eighth,
    EighthTriplet,
    Sixteenth,
    SixteenthTriplet,
}

impl Division {
    pub const COUNT: usize = 12;

    pub const LABELS: [&'static str; Self::COUNT] = [
        "1/1", "1/2.", "1/2", "1/2T", "1/4.", "1/4", "1/4T", "1/8.", "1/8", "1/8T", "1/16",
        "1/16T",
    ];

    /// Build from a selector index, clamping out-of-range values.
    pub fn from_index(index: usize) -> Self {
        match index {
            0 => Self::Whole,
            1 => Self::HalfDotted,
            2 => Self::Half,
            3 => Self::HalfTriplet,
            4 => Self::QuarterDotted,
            5 => Self::Quarter,
            6 => Self::QuarterTriplet,
            7 => Self::EighthDotted,
            8 => Self::Eighth,
            9 => Self::EighthTriplet,
            10 => Self::Sixteenth,
            _ => Self::SixteenthTriplet,
        }
    }

    /// Length in quarter-note beats
    pub fn beats(&self) -> f64 {
        match self {
            Self::Whole => 4.0,
            Self::HalfDotted => 3.0,
            Self::Half => 2.0,
            Self::HalfTriplet => 4.0 / 3.0,
            Self::QuarterDotted => 1.5,
            Self::Quarter => 1.0,
            Self::QuarterTriplet => 2.0 / 3.0,
            Self::EighthDotted => 0.75,
            Self::Eighth => 0.5,
            Self::EighthTriplet => 1.0 / 3.0,
            Self::Sixteenth => 0.25,
            Self::SixteenthTriplet => 1.0 / 6.0,
        }
    }

    /// Length in milliseconds at the given tempo
    pub fn ms_at(&self, tempo_bpm: f64) -> f64 {
        let tempo = tempo_bpm.clamp(MIN_TEMPO_BPM, MAX_TEMPO_BPM);
        self.beats() * 60_000.0 / tempo
    }
}

/// Arpeggiator grid subdivision (whole note down to 1/64)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum ArpRate {
    Whole,
    Half,
    Quarter,
    #[default]
    Eighth,
    Sixteenth,
    ThirtySecond,
    SixtyFourth,
}

impl ArpRate {
    pub const COUNT: usize = 7;

    pub const LABELS: [&'static str; Self::COUNT] =
        ["1/1", "1/2", "1/4", "1/8", "1/16", "1/32", "1/64"];

    pub fn from_index(index: usize) -> Self {
        match index {
            0 => Self::Whole,
            1 => Self::Half,
            2 => Self::Quarter,
            3 => Self::Eighth,
            4 => Self::Sixteenth,
            5 => Self::ThirtySecond,
            _ => Self::SixtyFourth,
        }
    }

    /// Grid interval in quarter-note beats
    pub fn beats(&self) -> f64 {
        match self {
            Self::Whole => 4.0,
            Self::Half => 2.0,
            Self::Quarter => 1.0,
            Self::Eighth => 0.5,
            Self::Sixteenth => 0.25,
            Self::ThirtySecond => 0.125,
            Self::SixtyFourth => 0.0625,
        }
    }
}
