//! Arpeggiator: beat-accurate MIDI event scheduler
//!
//! Held notes are expanded across the octave range into a sorted sequence; a
//! step cursor walks it per mode on a tempo-synced beat grid. With the
//! transport stopped the pattern free-runs on an internal beat clock advanced
//! from the current tempo. Note-offs whose end beat already passed are
//! emitted immediately at offset zero (catch-up), and a note-off always
//! precedes a note-on that lands on the same sample offset.

use ns_core::{ArpRate, NoteEvent, TimedEvent, Transport};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Maximum simultaneously held base notes
const MAX_HELD: usize = 128;

/// Octave expansion range
pub const MAX_OCTAVES: u32 = 4;

/// Step order mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArpMode {
    #[default]
    Up,
    Down,
    /// Bounce between the ends without repeating the boundary note
    UpDown,
    Random,
}

impl ArpMode {
    pub const LABELS: [&'static str; 4] = ["Up", "Down", "Up/Down", "Random"];

    pub fn from_index(index: usize) -> Self {
        match index {
            0 => Self::Up,
            1 => Self::Down,
            2 => Self::UpDown,
            _ => Self::Random,
        }
    }
}

/// Fixed-capacity output sink for scheduled events. Pushing past capacity
/// drops the event; the audio thread never allocates here.
#[derive(Debug)]
pub struct EventSink {
    events: Vec<TimedEvent>,
}

impl EventSink {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn push(&mut self, event: TimedEvent) {
        if self.events.len() < self.events.capacity() {
            self.events.push(event);
        }
    }

    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct HeldNote {
    note: u8,
    velocity: u8,
}

/// Arpeggiator unit
#[derive(Debug)]
pub struct Arpeggiator {
    held: Vec<HeldNote>,
    /// Octave-expanded, ascending (note, velocity) sequence
    sorted: Vec<(u8, u8)>,
    sorted_dirty: bool,

    mode: ArpMode,
    rate: ArpRate,
    gate: f64,
    octaves: u32,

    current_step: i32,
    direction: i32,
    /// Currently sounding note and its scheduled end beat
    playing_note: Option<(u8, f64)>,
    /// Free-running beat clock used while the transport is stopped
    internal_beat: f64,

    rng: SmallRng,
    sample_rate: f64,
}

impl Arpeggiator {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            held: Vec::with_capacity(MAX_HELD),
            sorted: Vec::with_capacity(MAX_HELD * MAX_OCTAVES as usize),
            sorted_dirty: false,
            mode: ArpMode::Up,
            rate: ArpRate::Eighth,
            gate: 0.8,
            octaves: 1,
            current_step: -1,
            direction: 1,
            playing_note: None,
            internal_beat: 0.0,
            rng: SmallRng::seed_from_u64(0x4152_5045_4747_494F),
            sample_rate,
        }
    }

    pub fn set_mode(&mut self, mode: ArpMode) {
        self.mode = mode;
    }

    pub fn set_rate(&mut self, rate: ArpRate) {
        self.rate = rate;
    }

    pub fn set_gate(&mut self, gate: f64) {
        self.gate = gate.clamp(0.1, 1.0);
    }

    pub fn set_octaves(&mut self, octaves: u32) {
        let octaves = octaves.clamp(1, MAX_OCTAVES);
        if octaves != self.octaves {
            self.octaves = octaves;
            self.sorted_dirty = true;
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    /// Held base-note count (before octave expansion)
    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Process one block: fold the incoming events into the held set, then
    /// emit scheduled note-ons/offs for every grid point inside the block.
    pub fn process(
        &mut self,
        events_in: &[TimedEvent],
        num_samples: usize,
        transport: &Transport,
        out: &mut EventSink,
    ) {
        for timed in events_in {
            self.apply_event(timed.event);
        }
        if self.sorted_dirty {
            self.rebuild_sequence();
        }

        if num_samples == 0 {
            return;
        }

        // Beat range for this block: host-mapped while playing, internal
        // clock while stopped so the pattern keeps free-running
        let (beat_start, beat_end) = if transport.playing {
            (transport.beat_start, transport.beat_end.max(transport.beat_start))
        } else {
            let start = self.internal_beat;
            let end = start + num_samples as f64 * transport.beats_per_sample(self.sample_rate);
            self.internal_beat = end;
            (start, end)
        };

        let beat_span = beat_end - beat_start;
        let beats_per_sample = if beat_span > 0.0 {
            beat_span / num_samples as f64
        } else {
            transport.beats_per_sample(self.sample_rate)
        };
        let to_offset = |beat: f64| -> u32 {
            let offset = ((beat - beat_start) / beats_per_sample).floor();
            (offset.max(0.0) as u32).min(num_samples as u32 - 1)
        };

        // Grid points: next boundary >= block start, then every interval
        let interval = self.rate.beats();
        let mut grid = (beat_start / interval).ceil() * interval;
        if grid < beat_start {
            grid += interval;
        }
        while grid < beat_end && !self.sorted.is_empty() {
            // Note-off due at or before this grid point. An end beat that
            // already passed the block start is a timing-jitter recovery
            // case: emit at offset zero rather than dropping or delaying.
            if let Some((note, end_beat)) = self.playing_note {
                if end_beat <= grid {
                    let offset = if end_beat <= beat_start {
                        0
                    } else {
                        to_offset(end_beat)
                    };
                    out.push(TimedEvent::new(offset, NoteEvent::NoteOff { note }));
                    self.playing_note = None;
                }
            }

            let offset = to_offset(grid);

            // Hand over: a note still sounding past the grid point ends
            // here, note-off before note-on at the identical offset
            if let Some((note, _)) = self.playing_note.take() {
                out.push(TimedEvent::new(offset, NoteEvent::NoteOff { note }));
            }

            let (note, velocity) = self.next_note();
            out.push(TimedEvent::new(offset, NoteEvent::NoteOn { note, velocity }));
            self.playing_note = Some((note, grid + interval * self.gate));

            grid += interval;
        }

        // A gated end landing inside this block (past the last grid point,
        // or with the pattern stopped) is emitted at its mapped offset
        if let Some((note, end_beat)) = self.playing_note {
            if end_beat < beat_end {
                let offset = if end_beat <= beat_start {
                    0
                } else {
                    to_offset(end_beat)
                };
                out.push(TimedEvent::new(offset, NoteEvent::NoteOff { note }));
                self.playing_note = None;
            }
        }
    }

    fn apply_event(&mut self, event: NoteEvent) {
        match event {
            NoteEvent::NoteOn { note, velocity } if velocity > 0 => {
                let was_empty = self.held.is_empty();
                if let Some(existing) = self.held.iter_mut().find(|h| h.note == note) {
                    existing.velocity = velocity;
                } else if self.held.len() < MAX_HELD {
                    self.held.push(HeldNote { note, velocity });
                }
                self.sorted_dirty = true;
                if was_empty {
                    // 0 → 1 transition restarts the pattern
                    self.current_step = -1;
                    self.direction = 1;
                }
            }
            NoteEvent::NoteOn { note, .. } | NoteEvent::NoteOff { note } => {
                self.held.retain(|h| h.note != note);
                self.sorted_dirty = true;
            }
            NoteEvent::AllNotesOff => {
                self.held.clear();
                self.sorted_dirty = true;
            }
        }
    }

    /// Expand the held set across the octave range, ascending
    fn rebuild_sequence(&mut self) {
        self.sorted.clear();
        for octave in 0..self.octaves {
            for h in &self.held {
                let note = h.note as u32 + 12 * octave;
                if note <= 127 {
                    self.sorted.push((note as u8, h.velocity));
                }
            }
        }
        self.sorted.sort_unstable_by_key(|&(note, _)| note);
        self.sorted.dedup_by_key(|&mut (note, _)| note);
        self.sorted_dirty = false;
    }

    /// Advance the cursor per mode and return the next pattern note
    fn next_note(&mut self) -> (u8, u8) {
        let len = self.sorted.len() as i32;
        debug_assert!(len > 0);

        let index = match self.mode {
            ArpMode::Up => {
                self.current_step = (self.current_step + 1).rem_euclid(len);
                self.current_step
            }
            ArpMode::Down => {
                self.current_step = if self.current_step < 0 {
                    len - 1
                } else {
                    (self.current_step - 1).rem_euclid(len)
                };
                self.current_step
            }
            ArpMode::UpDown => {
                if len == 1 {
                    self.current_step = 0;
                } else {
                    let mut next = self.current_step + self.direction;
                    if next >= len {
                        // Reverse at the top without repeating the boundary
                        self.direction = -1;
                        next = len - 2;
                    } else if next < 0 {
                        self.direction = 1;
                        next = (1).min(len - 1);
                    }
                    self.current_step = next;
                }
                self.current_step
            }
            ArpMode::Random => self.rng.random_range(0..len),
        };

        self.sorted[index as usize]
    }

    /// Clear all pattern state. Any sounding note is force-ended into `out`.
    pub fn reset(&mut self, out: &mut EventSink) {
        if let Some((note, _)) = self.playing_note.take() {
            out.push(TimedEvent::new(0, NoteEvent::NoteOff { note }));
        }
        self.held.clear();
        self.sorted.clear();
        self.sorted_dirty = false;
        self.current_step = -1;
        self.direction = 1;
        self.internal_beat = 0.0;
    }
}
