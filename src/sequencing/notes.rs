/*
Named Pitches
=============

Readable names for the MIDI keys the playback code refers to directly.
The MIDI formula: key = 12 * (octave + 1) + semitone, so C4 (middle C) = 60
and A4 (the 440 Hz tuning reference) = 69.

Durations are measured in quarter-note beats, so a whole note lasts 4.0.

Percussion keys follow the General MIDI drum map (channel 10, zero-based 9).
*/

/// Pitch value that marks a rest: the note takes up time but never sounds.
///
/// Rests are carried as a frequency rather than a key, so this is compared
/// against note frequencies; it never goes through pitch conversion.
pub const REST: f64 = -2_147_483_648.0;

pub const C4: u8 = 60;
pub const E4: u8 = 64;
pub const G4: u8 = 67;
pub const A4: u8 = 69;
pub const C5: u8 = 72;

// Rhythm values in quarter-note beats
pub const WHOLE_NOTE: f64 = 4.0;
pub const HALF_NOTE: f64 = 2.0;
pub const QUARTER_NOTE: f64 = 1.0;
pub const DOTTED_QUARTER_NOTE: f64 = 1.5;
pub const EIGHTH_NOTE: f64 = 0.5;
pub const SIXTEENTH_NOTE: f64 = 0.25;

// General MIDI percussion
pub const ACOUSTIC_BASS_DRUM: u8 = 35;
pub const SIDE_STICK: u8 = 37;
pub const HI_MID_TOM: u8 = 48;
pub const CLOSED_HI_HAT: u8 = 42;

/// Whether a frequency is the rest sentinel.
#[inline]
pub fn is_rest(frequency: f64) -> bool {
    frequency == REST
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn middle_c_and_a440() {
        assert_eq!(C4, 60);
        assert_eq!(A4, 69);
        assert_eq!(C5 - C4, 12);
    }

    #[test]
    fn rest_is_not_a_playable_frequency() {
        assert!(is_rest(REST));
        assert!(!is_rest(440.0));
        assert!(REST < crate::sequencing::pitch::MIN_FREQUENCY);
    }
}
