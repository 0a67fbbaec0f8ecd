//! Error type shared by every fallible playback operation.
//!
//! Only invalid input and device setup failures surface as errors. Running out
//! of voices, releasing something that was never held, or a single note the
//! device cannot render are reported through `log::warn!` and skipped, so that
//! one bad note never takes down the rest of a score.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    /// MIDI pitch outside 0..=127.
    #[error("pitch {0} is out of range, expected 0 to 127")]
    PitchOutOfRange(i32),

    /// Frequency outside the span MIDI pitches can reach.
    #[error("frequency {0} Hz is out of range, expected 8.17 to 12600.0 Hz")]
    FrequencyOutOfRange(f64),

    #[error("velocity {0} is out of range, expected 0 to 127")]
    VelocityOutOfRange(i32),

    #[error("panning {0} is out of range, expected 0 to 127")]
    PanningOutOfRange(i32),

    /// General MIDI program outside 0..=127.
    #[error("instrument {0} is out of range, expected 0 to 127")]
    InstrumentOutOfRange(i32),

    #[error("volume {0} is out of range, expected 0 to 127")]
    VolumeOutOfRange(f32),

    /// Pitch bend outside the zero-centred range -8192..=8191.
    #[error("pitch bend {0} is out of range, expected -8192 to 8191")]
    BendOutOfRange(i32),

    #[error("channel {0} is out of range, expected 0 to 15")]
    ChannelOutOfRange(u8),

    #[error("voice {voice} is out of range, instrument has {voices} voices")]
    VoiceOutOfRange { voice: usize, voices: usize },

    /// An instrument needs at least one voice.
    #[error("an instrument needs at least one voice, got {0}")]
    InvalidVoiceCount(usize),

    /// Parallel lists (attack times/values, pitches/durations, ...) differ in length.
    #[error("{what}: expected {expected} entries, got {actual}")]
    MismatchedLengths {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Envelope level or click accent outside 0.0..=1.0.
    #[error("level {0} is out of range, expected 0.0 to 1.0")]
    LevelOutOfRange(f64),

    /// Audio playback found a part on a channel with no instrument assigned.
    #[error("no instrument for channel {channel}, only {available} given")]
    MissingInstrument { channel: u8, available: usize },

    #[error("cannot schedule on negative beat {0}")]
    NegativeBeat(i32),

    #[error("tempo {0} BPM must be greater than zero")]
    InvalidTempo(f64),

    #[error("invalid time signature {numerator}/{denominator}")]
    InvalidTimeSignature { numerator: u8, denominator: u8 },

    /// Repeating timers need a positive period.
    #[error("repeat interval must be greater than zero milliseconds")]
    InvalidInterval,

    /// Note duration or length that is negative or not a number, or a start
    /// plus duration past the last representable millisecond.
    #[error("invalid time value {0}")]
    InvalidTime(f64),

    /// A MIDI or audio device could not be opened.
    #[error("device error: {0}")]
    Device(String),
}

pub type Result<T> = std::result::Result<T, PlaybackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_value() {
        assert_eq!(
            PlaybackError::PitchOutOfRange(130).to_string(),
            "pitch 130 is out of range, expected 0 to 127"
        );
        assert_eq!(
            PlaybackError::MismatchedLengths {
                what: "envelope attack values",
                expected: 2,
                actual: 3,
            }
            .to_string(),
            "envelope attack values: expected 2 entries, got 3"
        );
    }
}
