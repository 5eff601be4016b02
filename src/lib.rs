//! Frequency measurement with a gated edge counter
//!
//! A waveform output holds a gate line high for a precisely timed sampling window while an edge
//! counter accumulates the transitions of the input signal. See [sampler] for the measurement
//! loop, [configuration] for its settings and [hardware] for the peripheral capabilities it
//! consumes.
#![no_std]

pub mod configuration;
pub mod hardware;
pub mod sampler;

pub use configuration::{Config, ConfigError, Schedule};
pub use sampler::{Error, Events, FrequencyCounter, OnFrequency, Sample};
pub use waveform;
