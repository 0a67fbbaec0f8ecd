// Purpose: sample-level building blocks for the oscillator synth

pub mod oscillator;
pub mod ramp;
