//! ns-core: Shared types, traits, and utilities for the NextStudio DSP core
//!
//! This crate provides the foundational types used across all NextStudio crates:
//! sample and level types, lock-free parameter machinery, note events, and the
//! host transport snapshot consumed by tempo-synced units.

mod sample;
mod params;
mod midi;
mod transport;
mod error;

pub use sample::*;
pub use params::*;
pub use midi::*;
pub use transport::*;
pub use error::*;
