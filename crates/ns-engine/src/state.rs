//! Preset (structured state) persistence
//!
//! A unit's state document carries its kind tag plus named parameter values.
//! Restoring validates the tag against the live unit first: a mismatch is
//! rejected and logged, never partially applied. Restored values re-derive
//! the unit's atomic snapshots (clamped through the descriptors).

use ns_core::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

use crate::unit::DspUnit;

/// One persisted parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetParam {
    pub name: String,
    pub value: f64,
}

/// Persisted state of one unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitPreset {
    pub unit_type: String,
    pub params: Vec<PresetParam>,
}

/// Capture a unit's current parameter surface
pub fn capture_preset(unit: &DspUnit) -> UnitPreset {
    let params = unit.params();
    let descriptors = params.descriptors();
    UnitPreset {
        unit_type: unit.kind().tag().to_string(),
        params: descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| PresetParam {
                name: d.name.to_string(),
                value: params.value(i),
            })
            .collect(),
    }
}

/// Apply a preset to a live unit. The type tag must match the unit kind.
pub fn apply_preset(unit: &DspUnit, preset: &UnitPreset) -> EngineResult<()> {
    let expected = unit.kind().tag();
    if preset.unit_type != expected {
        log::warn!(
            "rejecting preset: type `{}` does not match live unit `{}`",
            preset.unit_type,
            expected
        );
        return Err(EngineError::PresetTypeMismatch {
            expected: expected.to_string(),
            found: preset.unit_type.clone(),
        });
    }

    let params = unit.params();
    let descriptors = params.descriptors();
    for p in &preset.params {
        match descriptors.iter().position(|d| d.name == p.name) {
            Some(index) => params.set_value(index, p.value),
            None => log::debug!("preset parameter `{}` unknown to `{}`", p.name, expected),
        }
    }
    Ok(())
}

/// Serialize a preset to JSON
pub fn preset_to_json(preset: &UnitPreset) -> EngineResult<String> {
    serde_json::to_string_pretty(preset).map_err(|e| EngineError::Serialization(e.to_string()))
}

/// Parse a preset from JSON
pub fn preset_from_json(json: &str) -> EngineResult<UnitPreset> {
    serde_json::from_str(json).map_err(|e| EngineError::Serialization(e.to_string()))
}
