use crate::error::{PlaybackError, Result};

/// Meter a metronome counts against.
///
/// Only the numerator drives beat counting; the denominator is carried so the
/// signature can be reported back the way it was given. Fields are private so
/// every value has been through [`TimeSignature::new`] or is a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSignature {
    numerator: u8,
    denominator: u8,
}

impl TimeSignature {
    /// Common time
    pub const FOUR_FOUR: TimeSignature = TimeSignature {
        numerator: 4,
        denominator: 4,
    };

    /// Waltz
    pub const THREE_FOUR: TimeSignature = TimeSignature {
        numerator: 3,
        denominator: 4,
    };

    pub const SIX_EIGHT: TimeSignature = TimeSignature {
        numerator: 6,
        denominator: 8,
    };

    /// Cut time
    pub const TWO_TWO: TimeSignature = TimeSignature {
        numerator: 2,
        denominator: 2,
    };

    /// Both parts must be positive and the denominator a power of two.
    pub fn new(numerator: u8, denominator: u8) -> Result<Self> {
        if numerator == 0 || !denominator.is_power_of_two() {
            return Err(PlaybackError::InvalidTimeSignature {
                numerator,
                denominator,
            });
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// Beats per measure, never zero.
    pub fn numerator(&self) -> u8 {
        self.numerator
    }

    /// Note value that gets one beat (4 = quarter, 8 = eighth).
    pub fn denominator(&self) -> u8 {
        self.denominator
    }

    /// Beat that follows `beat` (1-indexed), wrapping after the last one.
    pub fn next_beat(&self, beat: u32) -> u32 {
        beat % self.numerator as u32 + 1
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::FOUR_FOUR
    }
}
