//! Unit parameter surfaces
//!
//! Each unit owns a fixed, descriptor-backed set of atomic parameter slots.
//! The control/UI thread writes values through a shared handle; the audio
//! thread loads them (relaxed) at block rate and clamps before use. No
//! listener graph: updates are explicit and unidirectional.

use ns_core::{AtomicParam, ParamDescriptor};
use std::sync::Arc;

/// Control-plane view of a unit's parameters
pub trait ParamBlock: Send + Sync {
    fn descriptors(&self) -> &'static [ParamDescriptor];

    /// Current raw value of a parameter slot
    fn value(&self, index: usize) -> f64;

    /// Store a value (clamped to the descriptor range)
    fn set_value(&self, index: usize, value: f64);

    fn num_params(&self) -> usize {
        self.descriptors().len()
    }

    /// Display string for the current value
    fn value_text(&self, index: usize) -> String {
        self.descriptors()
            .get(index)
            .map(|d| d.value_to_text(self.value(index)))
            .unwrap_or_default()
    }
}

/// Fixed-size bank of atomic parameters bound to static descriptors
#[derive(Debug)]
pub struct ParamSet<const N: usize> {
    values: [AtomicParam; N],
    descriptors: &'static [ParamDescriptor; N],
}

impl<const N: usize> ParamSet<N> {
    pub fn new(descriptors: &'static [ParamDescriptor; N]) -> Arc<Self> {
        Arc::new(Self {
            values: std::array::from_fn(|i| AtomicParam::new(descriptors[i].range.default)),
            descriptors,
        })
    }

    /// Raw value, clamped to the descriptor range on the way out as well,
    /// so a torn or stale store can never escape the legal range
    #[inline]
    pub fn get(&self, index: usize) -> f64 {
        let d = &self.descriptors[index];
        d.range.clamp(self.values[index].get())
    }

    /// Value interpreted as a choice/step index
    #[inline]
    pub fn get_index(&self, index: usize) -> usize {
        self.get(index).round().max(0.0) as usize
    }

    /// Value interpreted as a toggle
    #[inline]
    pub fn get_bool(&self, index: usize) -> bool {
        self.get(index) >= 0.5
    }

    pub fn set(&self, index: usize, value: f64) {
        if index < N {
            self.values[index].set(self.descriptors[index].range.clamp(value));
        }
    }

    /// Reset every slot to its descriptor default
    pub fn reset_to_defaults(&self) {
        for (value, descriptor) in self.values.iter().zip(self.descriptors.iter()) {
            value.set(descriptor.range.default);
        }
    }
}

impl<const N: usize> ParamBlock for ParamSet<N> {
    fn descriptors(&self) -> &'static [ParamDescriptor] {
        self.descriptors
    }

    fn value(&self, index: usize) -> f64 {
        if index < N { self.get(index) } else { 0.0 }
    }

    fn set_value(&self, index: usize, value: f64) {
        self.set(index, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ns_core::{ParamRange, ParamUnit};

    static DESCS: [ParamDescriptor; 2] = [
        ParamDescriptor::new(0, "Gain", ParamRange::linear(0.0, 2.0, 1.0), ParamUnit::Plain),
        ParamDescriptor::new(
            1,
            "Cutoff",
            ParamRange::logarithmic(20.0, 20000.0, 1000.0),
            ParamUnit::Hertz,
        ),
    ];

    #[test]
    fn test_defaults_applied() {
        let set = ParamSet::new(&DESCS);
        assert_eq!(set.get(0), 1.0);
        assert_eq!(set.get(1), 1000.0);
    }

    #[test]
    fn test_set_clamps() {
        let set = ParamSet::new(&DESCS);
        set.set(0, 5.0);
        assert_eq!(set.get(0), 2.0);
        set.set(1, f64::NAN);
        assert_eq!(set.get(1), 1000.0);
        set.set(99, 1.0); // out-of-range index is ignored
    }

    #[test]
    fn test_param_block_text() {
        let set = ParamSet::new(&DESCS);
        set.set(1, 440.0);
        assert_eq!(ParamBlock::value_text(&*set, 1), "440.0 Hz");
    }
}
