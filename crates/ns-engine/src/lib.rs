//! ns-engine: Unit hosting for the NextStudio DSP core
//!
//! Wraps the seven DSP units behind a closed sum type with a uniform render
//! entry point, lock-free parameter surfaces, and preset persistence. There
//! is deliberately no open-ended plugin loading: the unit set is fixed, so
//! dispatch is an explicit match over `DspUnit`.

pub mod context;
pub mod params;
pub mod state;
pub mod unit;
pub mod wrappers;

pub use context::{AudioBuffer, RenderContext};
pub use params::{ParamBlock, ParamSet};
pub use state::{UnitPreset, apply_preset, capture_preset, preset_from_json, preset_to_json};
pub use unit::{DspUnit, UnitKind};
