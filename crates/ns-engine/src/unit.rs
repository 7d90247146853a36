//! Closed sum type over the seven DSP unit kinds
//!
//! The unit set is fixed, so dispatch is an explicit match rather than an
//! open plugin registry. Ownership is exclusive: a `DspUnit` is owned by its
//! parent graph node, parameters are owned by the unit and exposed to the
//! control plane through a shared `ParamBlock` handle.

use ns_dsp::arpeggiator::EventSink;
use std::sync::Arc;

use crate::context::RenderContext;
use crate::params::ParamBlock;
use crate::wrappers::{
    ArpeggiatorUnit, ChorusUnit, DelayUnit, ReverbUnit, SaturationUnit, SpectrumUnit, SynthUnit,
};

/// Unit kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Synth,
    Delay,
    Chorus,
    Reverb,
    Saturation,
    Spectrum,
    Arpeggiator,
}

impl UnitKind {
    pub const ALL: [UnitKind; 7] = [
        UnitKind::Synth,
        UnitKind::Delay,
        UnitKind::Chorus,
        UnitKind::Reverb,
        UnitKind::Saturation,
        UnitKind::Spectrum,
        UnitKind::Arpeggiator,
    ];

    /// Stable tag used in persisted state documents
    pub fn tag(&self) -> &'static str {
        match self {
            UnitKind::Synth => "synth",
            UnitKind::Delay => "delay",
            UnitKind::Chorus => "chorus",
            UnitKind::Reverb => "reverb",
            UnitKind::Saturation => "saturation",
            UnitKind::Spectrum => "spectrum",
            UnitKind::Arpeggiator => "arpeggiator",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.tag() == tag)
    }
}

/// One DSP unit behind the uniform engine interface
pub enum DspUnit {
    Synth(SynthUnit),
    Delay(DelayUnit),
    Chorus(ChorusUnit),
    Reverb(ReverbUnit),
    Saturation(SaturationUnit),
    Spectrum(SpectrumUnit),
    Arpeggiator(ArpeggiatorUnit),
}

impl DspUnit {
    /// Construct a unit prepared for `sample_rate`/`max_block`
    pub fn new(kind: UnitKind, sample_rate: f64, max_block: usize) -> Self {
        match kind {
            UnitKind::Synth => Self::Synth(SynthUnit::new(sample_rate, max_block)),
            UnitKind::Delay => Self::Delay(DelayUnit::new(sample_rate, max_block)),
            UnitKind::Chorus => Self::Chorus(ChorusUnit::new(sample_rate, max_block)),
            UnitKind::Reverb => Self::Reverb(ReverbUnit::new(sample_rate, max_block)),
            UnitKind::Saturation => Self::Saturation(SaturationUnit::new(sample_rate, max_block)),
            UnitKind::Spectrum => Self::Spectrum(SpectrumUnit::new(sample_rate, max_block)),
            UnitKind::Arpeggiator => {
                Self::Arpeggiator(ArpeggiatorUnit::new(sample_rate, max_block))
            }
        }
    }

    pub fn kind(&self) -> UnitKind {
        match self {
            Self::Synth(_) => UnitKind::Synth,
            Self::Delay(_) => UnitKind::Delay,
            Self::Chorus(_) => UnitKind::Chorus,
            Self::Reverb(_) => UnitKind::Reverb,
            Self::Saturation(_) => UnitKind::Saturation,
            Self::Spectrum(_) => UnitKind::Spectrum,
            Self::Arpeggiator(_) => UnitKind::Arpeggiator,
        }
    }

    /// Shared control-plane handle to this unit's parameters
    pub fn params(&self) -> Arc<dyn ParamBlock> {
        match self {
            Self::Synth(u) => u.params(),
            Self::Delay(u) => u.params(),
            Self::Chorus(u) => u.params(),
            Self::Reverb(u) => u.params(),
            Self::Saturation(u) => u.params(),
            Self::Spectrum(u) => u.params(),
            Self::Arpeggiator(u) => u.params(),
        }
    }

    /// Render entry point. Audio (if any) is processed in place; the
    /// arpeggiator writes its scheduled events into `midi_out`. A missing
    /// buffer or zero samples degrades to an event-only call.
    pub fn render(&mut self, ctx: &mut RenderContext, midi_out: &mut EventSink) {
        match self {
            Self::Synth(u) => u.render(ctx),
            Self::Delay(u) => u.render(ctx),
            Self::Chorus(u) => u.render(ctx),
            Self::Reverb(u) => u.render(ctx),
            Self::Saturation(u) => u.render(ctx),
            Self::Spectrum(u) => u.render(ctx),
            Self::Arpeggiator(u) => u.render(ctx, midi_out),
        }
    }

    /// (Re)prepare for a sample rate and maximum block size. The only place
    /// where allocation is permitted on the unit's behalf.
    pub fn initialise(&mut self, sample_rate: f64, max_block: usize) {
        match self {
            Self::Synth(u) => u.initialise(sample_rate, max_block),
            Self::Delay(u) => u.initialise(sample_rate, max_block),
            Self::Chorus(u) => u.initialise(sample_rate, max_block),
            Self::Reverb(u) => u.initialise(sample_rate, max_block),
            Self::Saturation(u) => u.initialise(sample_rate, max_block),
            Self::Spectrum(u) => u.initialise(sample_rate, max_block),
            Self::Arpeggiator(u) => u.initialise(sample_rate, max_block),
        }
    }

    /// Clear transient state (buffers, envelopes, filter memory) without
    /// reallocating. Called on transport stop and engine reinit.
    pub fn reset(&mut self, midi_out: &mut EventSink) {
        match self {
            Self::Synth(u) => u.reset(),
            Self::Delay(u) => u.reset(),
            Self::Chorus(u) => u.reset(),
            Self::Reverb(u) => u.reset(),
            Self::Saturation(u) => u.reset(),
            Self::Spectrum(u) => u.reset(),
            Self::Arpeggiator(u) => u.reset(midi_out),
        }
    }

    /// Release block-sized resources. Parameter values survive, but shared
    /// handles (params, meters, spectrum readers) must be re-acquired after
    /// the next `initialise`.
    pub fn deinitialise(&mut self) {
        let kind = self.kind();
        let params = self.params();
        let values: Vec<f64> = (0..params.num_params()).map(|i| params.value(i)).collect();
        *self = DspUnit::new(kind, 48000.0, 0);
        let params = self.params();
        for (i, v) in values.iter().enumerate() {
            params.set_value(i, *v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ns_core::Transport;

    #[test]
    fn test_tag_round_trip() {
        for kind in UnitKind::ALL {
            assert_eq!(UnitKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(UnitKind::from_tag("mystery"), None);
    }

    #[test]
    fn test_every_kind_constructs_and_renders_empty() {
        let mut sink = EventSink::with_capacity(16);
        for kind in UnitKind::ALL {
            let mut unit = DspUnit::new(kind, 48000.0, 256);
            let mut ctx = RenderContext::new(None, &[], Transport::default());
            unit.render(&mut ctx, &mut sink);
            unit.reset(&mut sink);
        }
    }

    #[test]
    fn test_deinitialise_preserves_values() {
        let mut unit = DspUnit::new(UnitKind::Delay, 48000.0, 256);
        unit.params().set_value(crate::wrappers::DelayUnit::TIME_MS, 750.0);
        unit.deinitialise();
        assert_eq!(
            unit.params().value(crate::wrappers::DelayUnit::TIME_MS),
            750.0
        );
    }
}
