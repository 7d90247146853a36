//! Parameter types for audio processors
//!
//! Parameters are owned by their processing unit and read by the audio thread
//! via lock-free atomic snapshots; the control/UI thread only ever writes.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Parameter ID (stable index within a unit's parameter surface)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamId(pub u32);

/// Atomic parameter for lock-free access.
///
/// UI thread writes, audio thread reads. Relaxed ordering is sufficient:
/// parameter values are independent controls, not causally linked to other
/// shared state.
#[derive(Debug)]
pub struct AtomicParam {
    bits: AtomicU64,
}

impl AtomicParam {
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl Default for AtomicParam {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Parameter skew type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParamSkew {
    Linear,
    Logarithmic,
    Exponential(f64),
}

/// Parameter range specification
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub skew: ParamSkew,
}

impl ParamRange {
    pub const fn linear(min: f64, max: f64, default: f64) -> Self {
        Self {
            min,
            max,
            default,
            skew: ParamSkew::Linear,
        }
    }

    pub const fn logarithmic(min: f64, max: f64, default: f64) -> Self {
        Self {
            min,
            max,
            default,
            skew: ParamSkew::Logarithmic,
        }
    }

    pub const fn exponential(min: f64, max: f64, default: f64, exp: f64) -> Self {
        Self {
            min,
            max,
            default,
            skew: ParamSkew::Exponential(exp),
        }
    }

    /// A discrete selector over `count` choices, stored as 0..count-1.
    pub const fn stepped(count: u32, default: f64) -> Self {
        Self {
            min: 0.0,
            max: (count - 1) as f64,
            default,
            skew: ParamSkew::Linear,
        }
    }

    /// Clamp a value into the legal range. Every consumer site clamps before
    /// use, so out-of-range automation or corrupted state degrades to the
    /// nearest valid value rather than producing NaN/Inf.
    #[inline]
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_finite() {
            value.clamp(self.min, self.max)
        } else {
            self.default
        }
    }

    /// Denormalize a 0-1 value to actual value
    pub fn denormalize(&self, normalized: f64) -> f64 {
        let n = normalized.clamp(0.0, 1.0);
        match self.skew {
            ParamSkew::Linear => self.min + n * (self.max - self.min),
            ParamSkew::Logarithmic => {
                let log_min = self.min.ln();
                let log_max = self.max.ln();
                (log_min + n * (log_max - log_min)).exp()
            }
            ParamSkew::Exponential(exp) => self.min + n.powf(exp) * (self.max - self.min),
        }
    }

    /// Normalize an actual value to 0-1
    pub fn normalize(&self, value: f64) -> f64 {
        let clamped = self.clamp(value);
        match self.skew {
            ParamSkew::Linear => (clamped - self.min) / (self.max - self.min),
            ParamSkew::Logarithmic => {
                let log_min = self.min.ln();
                let log_max = self.max.ln();
                (clamped.ln() - log_min) / (log_max - log_min)
            }
            ParamSkew::Exponential(exp) => {
                ((clamped - self.min) / (self.max - self.min)).powf(1.0 / exp)
            }
        }
    }
}

/// Display unit for a parameter, driving value↔string mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamUnit {
    Plain,
    Hertz,
    Milliseconds,
    Decibels,
    Percent,
    Semitones,
    Cents,
    /// Index into a fixed choice list
    Choice(&'static [&'static str]),
}

/// Parameter metadata: name, range, and display mapping
#[derive(Debug, Clone, Copy)]
pub struct ParamDescriptor {
    pub id: ParamId,
    pub name: &'static str,
    pub range: ParamRange,
    pub unit: ParamUnit,
}

impl ParamDescriptor {
    pub const fn new(id: u32, name: &'static str, range: ParamRange, unit: ParamUnit) -> Self {
        Self {
            id: ParamId(id),
            name,
            range,
            unit,
        }
    }

    /// Map a value to its display string
    pub fn value_to_text(&self, value: f64) -> String {
        let v = self.range.clamp(value);
        match self.unit {
            ParamUnit::Plain => format!("{:.2}", v),
            ParamUnit::Hertz => {
                if v >= 1000.0 {
                    format!("{:.2} kHz", v / 1000.0)
                } else {
                    format!("{:.1} Hz", v)
                }
            }
            ParamUnit::Milliseconds => {
                if v >= 1000.0 {
                    format!("{:.2} s", v / 1000.0)
                } else {
                    format!("{:.1} ms", v)
                }
            }
            ParamUnit::Decibels => format!("{:+.1} dB", v),
            ParamUnit::Percent => format!("{:.0} %", v * 100.0),
            ParamUnit::Semitones => format!("{:+.1} st", v),
            ParamUnit::Cents => format!("{:+.0} ct", v),
            ParamUnit::Choice(labels) => {
                let index = (v.round() as usize).min(labels.len().saturating_sub(1));
                labels.get(index).copied().unwrap_or("?").to_string()
            }
        }
    }

    /// Parse a display string back to a value. Falls back to the default on
    /// unparseable input.
    pub fn text_to_value(&self, text: &str) -> f64 {
        if let ParamUnit::Choice(labels) = self.unit {
            if let Some(index) = labels.iter().position(|l| l.eq_ignore_ascii_case(text.trim())) {
                return index as f64;
            }
        }
        let stripped: String = text
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-' || *c == '+')
            .collect();
        let mut parsed = stripped.parse::<f64>().unwrap_or(self.range.default);
        // Undo display scaling
        match self.unit {
            ParamUnit::Percent => parsed /= 100.0,
            ParamUnit::Hertz if text.to_ascii_lowercase().contains("khz") => parsed *= 1000.0,
            ParamUnit::Milliseconds if text.trim_end().ends_with('s') && !text.contains("ms") => {
                parsed *= 1000.0
            }
            _ => {}
        }
        self.range.clamp(parsed)
    }
}
