use crate::error::{PlaybackError, Result};

/*
Pitch, Frequency and Pitch Bend
===============================

MIDI devices only understand integer keys (0..=127). A frequency that falls
between two keys is played as the nearest key plus a pitch bend on the channel.
This module converts between the three representations.

Vocabulary
----------

  pitch        Integer MIDI key. A4 = 69 = 440 Hz, middle C = 60.

  frequency    Hertz. Continuous.

  bend         Fine tuning in pitch-bend units. We use a zero-centred range
               (-8192..=8191) everywhere inside the crate. The wire format is
               unsigned 14-bit (0..=16383, centred on 8192) and the offset is
               applied only when a message is written to a device.

  bend range   How many semitones the full bend span covers. We assume 4
               (two below, two above), the General MIDI default.


The Math
--------

    x     = 12 * log2(frequency / 440) + 69     continuous pitch
    pitch = round(x)
    bend  = round((x - pitch) * 8192 / 4 * 2)    = (x - pitch) * 4096

One semitone is 4096 bend units, so the nearest-key remainder (at most half a
semitone) never needs more than +-2048 units and always fits, leaving room for
a channel-wide bend on top.

Going back:

    frequency = 440 * 2^((pitch - 69) / 12)

At integer pitches the two directions are exact inverses.
*/

/// Reference frequency of A4.
pub const CONCERT_PITCH: f64 = 440.0;

/// MIDI key of A4.
pub const CONCERT_KEY: i32 = 69;

/// Semitones covered by the full pitch-bend span.
pub const BEND_RANGE_SEMITONES: f64 = 4.0;

/// Wire-level 14-bit bend limits.
pub const PITCHBEND_MIN: i32 = 0;
pub const PITCHBEND_MAX: i32 = 16383;
pub const PITCHBEND_NORMAL: i32 = 8192;

/// Zero-centred bend limits used throughout the crate.
pub const BEND_MIN: i32 = PITCHBEND_MIN - PITCHBEND_NORMAL;
pub const BEND_MAX: i32 = PITCHBEND_MAX - PITCHBEND_NORMAL;

/// Bend units per semitone with the default bend range.
pub const BEND_PER_SEMITONE: f64 = PITCHBEND_NORMAL as f64 / BEND_RANGE_SEMITONES * 2.0;

/// Lowest and highest frequencies that map onto MIDI keys 0..=127.
pub const MIN_FREQUENCY: f64 = 8.17;
pub const MAX_FREQUENCY: f64 = 12600.0;

/// Frequency in Hz of a MIDI key.
#[inline]
pub fn pitch_to_frequency(pitch: u8) -> f64 {
    CONCERT_PITCH * 2.0_f64.powf((pitch as f64 - CONCERT_KEY as f64) / 12.0)
}

/// Nearest MIDI key and the zero-centred bend that reaches `frequency` from it.
///
/// Callers must filter out rests before converting; a rest has no pitch.
pub fn frequency_to_pitch_and_bend(frequency: f64) -> (i32, i32) {
    let x = 12.0 * (frequency / CONCERT_PITCH).log2() + CONCERT_KEY as f64;
    let pitch = x.round();
    let bend = ((x - pitch) * BEND_PER_SEMITONE).round();
    (pitch as i32, bend as i32)
}

/// Semitones represented by a zero-centred bend value.
#[inline]
pub fn bend_to_semitones(bend: i32) -> f64 {
    bend as f64 / BEND_PER_SEMITONE
}

/// Frequency reached by bending `pitch` by `bend` units.
pub fn bent_frequency(pitch: u8, bend: i32) -> f64 {
    pitch_to_frequency(pitch) * 2.0_f64.powf(bend_to_semitones(bend) / 12.0)
}

/// Shift a frequency by a (possibly fractional) number of semitones.
pub fn transpose_frequency(frequency: f64, semitones: f64) -> f64 {
    frequency * 2.0_f64.powf(semitones / 12.0)
}

/// Convert a zero-centred bend to the unsigned wire value, if it fits.
pub fn bend_to_wire(bend: i32) -> Option<u16> {
    let wire = bend + PITCHBEND_NORMAL;
    (PITCHBEND_MIN..=PITCHBEND_MAX)
        .contains(&wire)
        .then_some(wire as u16)
}

pub fn check_pitch(pitch: i32) -> Result<u8> {
    if (0..=127).contains(&pitch) {
        Ok(pitch as u8)
    } else {
        Err(PlaybackError::PitchOutOfRange(pitch))
    }
}

pub fn check_frequency(frequency: f64) -> Result<f64> {
    if (MIN_FREQUENCY..=MAX_FREQUENCY).contains(&frequency) {
        Ok(frequency)
    } else {
        Err(PlaybackError::FrequencyOutOfRange(frequency))
    }
}

pub fn check_bend(bend: i32) -> Result<i32> {
    if (BEND_MIN..=BEND_MAX).contains(&bend) {
        Ok(bend)
    } else {
        Err(PlaybackError::BendOutOfRange(bend))
    }
}

/// Velocity, volume and panning all share the 0..=127 controller range.
pub fn check_velocity(velocity: i32) -> Result<u8> {
    if (0..=127).contains(&velocity) {
        Ok(velocity as u8)
    } else {
        Err(PlaybackError::VelocityOutOfRange(velocity))
    }
}

pub fn check_panning(panning: i32) -> Result<u8> {
    if (0..=127).contains(&panning) {
        Ok(panning as u8)
    } else {
        Err(PlaybackError::PanningOutOfRange(panning))
    }
}

pub fn check_instrument(program: i32) -> Result<u8> {
    if (0..=127).contains(&program) {
        Ok(program as u8)
    } else {
        Err(PlaybackError::InstrumentOutOfRange(program))
    }
}

pub fn check_volume(volume: f32) -> Result<f32> {
    if (0.0..=127.0).contains(&volume) {
        Ok(volume)
    } else {
        Err(PlaybackError::VolumeOutOfRange(volume))
    }
}

/// Durations and lengths: finite and not negative.
pub fn check_time(time: f64) -> Result<f64> {
    if time.is_finite() && time >= 0.0 {
        Ok(time)
    } else {
        Err(PlaybackError::InvalidTime(time))
    }
}

pub fn check_tempo(tempo: f64) -> Result<f64> {
    if tempo.is_finite() && tempo > 0.0 {
        Ok(tempo)
    } else {
        Err(PlaybackError::InvalidTempo(tempo))
    }
}

pub fn check_channel(channel: u8) -> Result<u8> {
    if channel < 16 {
        Ok(channel)
    } else {
        Err(PlaybackError::ChannelOutOfRange(channel))
    }
}

/// Linear map of `value` from one range onto another.
#[inline]
pub(crate) fn map_range(value: f64, from: (f64, f64), to: (f64, f64)) -> f64 {
    let normal = (value - from.0) / (from.1 - from.0);
    normal * (to.1 - to.0) + to.0
}
