//! Note events with sample-accurate timing
//!
//! The DSP core consumes a per-block stream of timestamped note events from
//! the host and (for the arpeggiator) emits one back. Offsets are sample
//! positions relative to the start of the current block.

use serde::{Deserialize, Serialize};

/// MIDI note number (0-127)
pub type NoteNumber = u8;

/// MIDI velocity (0-127)
pub type Velocity = u8;

/// A note/control event consumed or produced by a DSP unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteEvent {
    NoteOn { note: NoteNumber, velocity: Velocity },
    NoteOff { note: NoteNumber },
    AllNotesOff,
}

/// An event with its sample offset within the current block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedEvent {
    pub offset: u32,
    pub event: NoteEvent,
}

impl TimedEvent {
    pub const fn new(offset: u32, event: NoteEvent) -> Self {
        Self { offset, event }
    }
}

/// Convert a MIDI note number (plus a cents offset) to a frequency in Hz,
/// equal temperament, A4 (note 69) = 440 Hz.
#[inline]
pub fn note_to_frequency(note: NoteNumber, cents: f64) -> f64 {
    let semis = note as f64 - 69.0 + cents / 100.0;
    440.0 * (semis / 12.0).exp2()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_pitch() {
        assert!((note_to_frequency(69, 0.0) - 440.0).abs() < 1e-9);
        assert!((note_to_frequency(81, 0.0) - 880.0).abs() < 1e-9);
        assert!((note_to_frequency(60, 0.0) - 261.6256).abs() < 1e-3);
    }

    #[test]
    fn test_cents_detune() {
        // +100 cents = one semitone up
        let up = note_to_frequency(69, 100.0);
        assert!((up - note_to_frequency(70, 0.0)).abs() < 1e-9);
    }
}
