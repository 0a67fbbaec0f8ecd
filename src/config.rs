//! Playback settings shared by the engine, its instruments and metronomes.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{PlaybackError, Result};
use crate::sequencing::notes::ACOUSTIC_BASS_DRUM;
use crate::sequencing::pitch::{check_channel, check_panning, check_pitch, check_velocity};

/// Number of voices an instrument gets when none is specified.
pub const DEFAULT_VOICES: usize = 16;

/// Centre of the 0..=127 panning range.
pub const PAN_CENTER: u8 = 63;

/// MIDI percussion channel (zero-based).
pub const PERCUSSION_CHANNEL: u8 = 9;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackConfig {
    /// Voice pool size for instruments created through the engine
    pub voices_per_instrument: usize,
    /// Panning used by voice notes that do not carry their own (0..=127)
    pub default_panning: u8,
    /// Key played by an audible metronome
    pub click_pitch: u8,
    /// Channel the metronome click is sent on
    pub click_channel: u8,
    /// Velocity of the first beat of a measure
    pub click_volume: u8,
    /// Length of each click in milliseconds
    pub click_length_ms: u64,
    /// Velocity ratio of the other beats relative to the first
    pub click_accent_ratio: f32,
    /// Client name announced to the MIDI subsystem
    pub midi_client_name: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            voices_per_instrument: DEFAULT_VOICES,
            default_panning: PAN_CENTER,
            click_pitch: ACOUSTIC_BASS_DRUM,
            click_channel: PERCUSSION_CHANNEL,
            click_volume: 127,
            click_length_ms: 200,
            click_accent_ratio: 0.7,
            midi_client_name: "accordium".to_string(),
        }
    }
}

impl PlaybackConfig {
    pub fn with_voices(mut self, voices: usize) -> Result<Self> {
        if voices == 0 {
            return Err(PlaybackError::InvalidVoiceCount(voices));
        }
        self.voices_per_instrument = voices;
        Ok(self)
    }

    pub fn with_default_panning(mut self, panning: i32) -> Result<Self> {
        self.default_panning = check_panning(panning)?;
        Ok(self)
    }

    /// Configure the metronome click (key, channel, first-beat velocity)
    pub fn with_click(mut self, pitch: i32, channel: u8, volume: i32) -> Result<Self> {
        self.click_pitch = check_pitch(pitch)?;
        self.click_channel = check_channel(channel)?;
        self.click_volume = check_velocity(volume)?;
        Ok(self)
    }

    /// Velocity of the other beats relative to the first, 0.0 to 1.0
    pub fn with_click_accent(mut self, ratio: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(PlaybackError::LevelOutOfRange(ratio as f64));
        }
        self.click_accent_ratio = ratio;
        Ok(self)
    }

    pub fn with_midi_client_name(mut self, name: impl Into<String>) -> Self {
        self.midi_client_name = name.into();
        self
    }

    /// Check every field, for configs built or deserialized field by field.
    pub fn validate(&self) -> Result<()> {
        if self.voices_per_instrument == 0 {
            return Err(PlaybackError::InvalidVoiceCount(0));
        }
        check_panning(self.default_panning as i32)?;
        check_pitch(self.click_pitch as i32)?;
        check_channel(self.click_channel)?;
        check_velocity(self.click_volume as i32)?;
        if !(0.0..=1.0).contains(&self.click_accent_ratio) {
            return Err(PlaybackError::LevelOutOfRange(self.click_accent_ratio as f64));
        }
        Ok(())
    }

    /// Velocity for a click on `beat` (1 = strong beat)
    pub fn click_velocity(&self, beat: u32) -> u8 {
        self.accented_velocity(self.click_volume, beat)
    }

    /// `volume` on beat 1, scaled by the accent ratio on the others
    pub fn accented_velocity(&self, volume: u8, beat: u32) -> u8 {
        if beat == 1 {
            volume
        } else {
            (volume as f32 * self.click_accent_ratio) as u8
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_a_general_midi_setup() {
        let config = PlaybackConfig::default();
        assert_eq!(config.voices_per_instrument, 16);
        assert_eq!(config.default_panning, 63);
        assert_eq!(config.click_channel, 9);
    }

    #[test]
    fn secondary_beats_are_softer() {
        let config = PlaybackConfig::default();
        assert_eq!(config.click_velocity(1), 127);
        assert_eq!(config.click_velocity(2), 88);
    }

    #[test]
    fn builder_rejects_out_of_range_settings() {
        let config = PlaybackConfig::default();
        assert_eq!(
            config.clone().with_voices(0),
            Err(PlaybackError::InvalidVoiceCount(0))
        );
        assert_eq!(
            config.clone().with_default_panning(128),
            Err(PlaybackError::PanningOutOfRange(128))
        );
        assert_eq!(
            config.clone().with_click(200, 9, 100),
            Err(PlaybackError::PitchOutOfRange(200))
        );
        assert_eq!(
            config.clone().with_click(35, 16, 100),
            Err(PlaybackError::ChannelOutOfRange(16))
        );
        assert_eq!(
            config.clone().with_click(35, 9, 130),
            Err(PlaybackError::VelocityOutOfRange(130))
        );
        assert!(config.clone().with_click_accent(1.5).is_err());
        assert!(config.with_click_accent(-0.1).is_err());
    }

    #[test]
    fn builder_keeps_valid_settings() {
        let config = PlaybackConfig::default()
            .with_voices(4)
            .and_then(|c| c.with_default_panning(0))
            .and_then(|c| c.with_click(76, 9, 100))
            .and_then(|c| c.with_click_accent(0.5))
            .unwrap();
        assert_eq!(config.voices_per_instrument, 4);
        assert_eq!(config.default_panning, 0);
        assert_eq!(config.click_pitch, 76);
        assert_eq!(config.click_velocity(3), 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_catches_fields_set_directly() {
        let mut config = PlaybackConfig::default();
        config.click_accent_ratio = 2.0;
        assert_eq!(config.validate(), Err(PlaybackError::LevelOutOfRange(2.0)));

        let mut config = PlaybackConfig::default();
        config.default_panning = 200;
        assert_eq!(config.validate(), Err(PlaybackError::PanningOutOfRange(200)));
    }
}
