pub mod config; // Playback settings
pub mod dsp; // Oscillators and ramps for the voice synth
pub mod engine; // Timers, channels, instruments, metronomes, sequences
pub mod error;
pub mod io; // MIDI out, audio out, recorders
pub mod sequencing; // Notes, phrases, parts, scores, envelopes
pub mod synth; // Polyphonic oscillator bank

pub use config::PlaybackConfig;
pub use engine::instrument::{Instrument, VoiceOutput};
pub use engine::{CallbackId, Click, Engine, Metronome, Sequence, TimerId};
pub use error::{PlaybackError, Result};
pub use sequencing::{Envelope, Material, Note, Part, Phrase, Score, TimeSignature};

/// Largest block the audio callback renders in one pass, in frames.
pub const MAX_BLOCK_SIZE: usize = 2048;
