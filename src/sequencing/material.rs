//! The musical material tree: notes grouped into phrases, phrases into parts,
//! parts into a score.
//!
//! Every playback entry point accepts any level through [`Material`] and
//! promotes it to a [`Score`] before flattening.

use crate::error::{PlaybackError, Result};
use crate::sequencing::notes::{is_rest, REST};
use crate::sequencing::pitch::{
    check_channel, check_frequency, check_instrument, check_pitch, check_tempo, check_time,
    check_velocity, frequency_to_pitch_and_bend, pitch_to_frequency,
};

/// Tempo a score plays at unless something below it says otherwise.
pub const DEFAULT_TEMPO: f64 = 60.0;

/// A single pitched event or rest.
///
/// The pitch is stored once, as a frequency, so the pitch and frequency views
/// can never disagree. Durations are in quarter-note beats.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    frequency: f64,
    duration: f64,
    length: f64,
    dynamic: u8,
    pan: f64,
}

impl Note {
    pub const DEFAULT_DYNAMIC: u8 = 85;
    pub const DEFAULT_PAN: f64 = 0.5;
    /// Sounding length relative to duration for new notes.
    pub const LENGTH_RATIO: f64 = 0.9;

    pub fn new(pitch: i32, duration: f64) -> Result<Self> {
        let pitch = check_pitch(pitch)?;
        Self::build(pitch_to_frequency(pitch), duration)
    }

    pub fn from_frequency(frequency: f64, duration: f64) -> Result<Self> {
        Self::build(check_frequency(frequency)?, duration)
    }

    pub fn rest(duration: f64) -> Result<Self> {
        Self::build(REST, duration)
    }

    fn build(frequency: f64, duration: f64) -> Result<Self> {
        let duration = check_time(duration)?;
        Ok(Self {
            frequency,
            duration,
            length: duration * Self::LENGTH_RATIO,
            dynamic: Self::DEFAULT_DYNAMIC,
            pan: Self::DEFAULT_PAN,
        })
    }

    pub fn with_dynamic(mut self, dynamic: i32) -> Result<Self> {
        self.set_dynamic(dynamic)?;
        Ok(self)
    }

    pub fn with_pan(mut self, pan: f64) -> Result<Self> {
        self.set_pan(pan)?;
        Ok(self)
    }

    pub fn with_length(mut self, length: f64) -> Result<Self> {
        self.set_length(length)?;
        Ok(self)
    }

    pub fn is_rest(&self) -> bool {
        is_rest(self.frequency)
    }

    /// Nearest MIDI key, or `None` for a rest.
    pub fn pitch(&self) -> Option<u8> {
        if self.is_rest() {
            return None;
        }
        let (pitch, _) = frequency_to_pitch_and_bend(self.frequency);
        Some(pitch.clamp(0, 127) as u8)
    }

    /// Frequency in Hz, or [`REST`] for a rest.
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn set_pitch(&mut self, pitch: i32) -> Result<()> {
        self.frequency = pitch_to_frequency(check_pitch(pitch)?);
        Ok(())
    }

    pub fn set_frequency(&mut self, frequency: f64) -> Result<()> {
        self.frequency = check_frequency(frequency)?;
        Ok(())
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Change the slot the note occupies, keeping its length/duration ratio.
    pub fn set_duration(&mut self, duration: f64) -> Result<()> {
        let duration = check_time(duration)?;
        let ratio = if self.duration > 0.0 {
            self.length / self.duration
        } else {
            Self::LENGTH_RATIO
        };
        self.duration = duration;
        self.length = duration * ratio;
        Ok(())
    }

    /// How long the note actually sounds, in beats.
    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn set_length(&mut self, length: f64) -> Result<()> {
        self.length = check_time(length)?;
        Ok(())
    }

    pub fn dynamic(&self) -> u8 {
        self.dynamic
    }

    pub fn set_dynamic(&mut self, dynamic: i32) -> Result<()> {
        self.dynamic = check_velocity(dynamic)?;
        Ok(())
    }

    /// Stereo position, 0.0 (left) to 1.0 (right).
    pub fn pan(&self) -> f64 {
        self.pan
    }

    pub fn set_pan(&mut self, pan: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&pan) {
            return Err(PlaybackError::LevelOutOfRange(pan));
        }
        self.pan = pan;
        Ok(())
    }
}

/// Notes played one after another from a start time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Phrase {
    notes: Vec<Note>,
    start_time: f64,
    tempo: Option<f64>,
    instrument: Option<u8>,
}

impl Phrase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty phrase starting `start_time` beats into its part.
    pub fn at(start_time: f64) -> Result<Self> {
        Ok(Self {
            start_time: check_time(start_time)?,
            ..Self::default()
        })
    }

    pub fn with_tempo(mut self, tempo: f64) -> Result<Self> {
        self.tempo = Some(check_tempo(tempo)?);
        Ok(self)
    }

    pub fn with_instrument(mut self, program: i32) -> Result<Self> {
        self.instrument = Some(check_instrument(program)?);
        Ok(self)
    }

    pub fn add_note(&mut self, note: Note) -> &mut Self {
        self.notes.push(note);
        self
    }

    /// Append a chord: every pitch but the last gets duration 0, the last one
    /// carries `duration` and ends the chord.
    pub fn add_chord(&mut self, pitches: &[i32], duration: f64) -> Result<()> {
        let Some((last, members)) = pitches.split_last() else {
            return Ok(());
        };
        let mut chord = Vec::with_capacity(pitches.len());
        for &pitch in members {
            chord.push(Note::new(pitch, 0.0)?);
        }
        chord.push(Note::new(*last, duration)?);
        self.notes.extend(chord);
        Ok(())
    }

    /// Append notes from parallel pitch and duration lists.
    ///
    /// Nothing is appended unless every pair is valid.
    pub fn add_note_list(&mut self, pitches: &[i32], durations: &[f64]) -> Result<()> {
        if pitches.len() != durations.len() {
            return Err(PlaybackError::MismatchedLengths {
                what: "note durations",
                expected: pitches.len(),
                actual: durations.len(),
            });
        }
        let notes = pitches
            .iter()
            .zip(durations)
            .map(|(&pitch, &duration)| Note::new(pitch, duration))
            .collect::<Result<Vec<_>>>()?;
        self.notes.extend(notes);
        Ok(())
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn notes_mut(&mut self) -> &mut Vec<Note> {
        &mut self.notes
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn set_start_time(&mut self, start_time: f64) -> Result<()> {
        self.start_time = check_time(start_time)?;
        Ok(())
    }

    pub fn tempo(&self) -> Option<f64> {
        self.tempo
    }

    pub fn instrument(&self) -> Option<u8> {
        self.instrument
    }

    /// Beats from the phrase start to the end of its last note slot.
    pub fn beat_length(&self) -> f64 {
        self.notes.iter().map(Note::duration).sum()
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.beat_length()
    }
}

/// Phrases sharing a MIDI channel.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Part {
    phrases: Vec<Phrase>,
    channel: u8,
    tempo: Option<f64>,
    instrument: Option<u8>,
}

impl Part {
    pub fn new(channel: u8) -> Result<Self> {
        Ok(Self {
            channel: check_channel(channel)?,
            ..Self::default()
        })
    }

    pub fn with_tempo(mut self, tempo: f64) -> Result<Self> {
        self.tempo = Some(check_tempo(tempo)?);
        Ok(self)
    }

    pub fn with_instrument(mut self, program: i32) -> Result<Self> {
        self.instrument = Some(check_instrument(program)?);
        Ok(self)
    }

    pub fn add_phrase(&mut self, phrase: Phrase) -> &mut Self {
        self.phrases.push(phrase);
        self
    }

    pub fn phrases(&self) -> &[Phrase] {
        &self.phrases
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn tempo(&self) -> Option<f64> {
        self.tempo
    }

    pub fn instrument(&self) -> Option<u8> {
        self.instrument
    }
}

/// The top of the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    parts: Vec<Part>,
    tempo: f64,
}

impl Default for Score {
    fn default() -> Self {
        Self {
            parts: Vec::new(),
            tempo: DEFAULT_TEMPO,
        }
    }
}

impl Score {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tempo(mut self, tempo: f64) -> Result<Self> {
        self.tempo = check_tempo(tempo)?;
        Ok(self)
    }

    pub fn add_part(&mut self, part: Part) -> &mut Self {
        self.parts.push(part);
        self
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn set_tempo(&mut self, tempo: f64) -> Result<()> {
        self.tempo = check_tempo(tempo)?;
        Ok(())
    }
}

/// Any level of the material tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Material {
    Note(Note),
    Phrase(Phrase),
    Part(Part),
    Score(Score),
}

impl Material {
    /// Wrap one level up. A score stays a score.
    pub fn promote(self) -> Material {
        match self {
            Material::Note(note) => {
                let mut phrase = Phrase::new();
                phrase.add_note(note);
                Material::Phrase(phrase)
            }
            Material::Phrase(phrase) => {
                let mut part = Part::default();
                part.add_phrase(phrase);
                Material::Part(part)
            }
            Material::Part(part) => {
                let mut score = Score::new();
                score.add_part(part);
                Material::Score(score)
            }
            score @ Material::Score(_) => score,
        }
    }

    pub fn into_score(self) -> Score {
        let mut material = self;
        loop {
            match material {
                Material::Score(score) => return score,
                other => material = other.promote(),
            }
        }
    }
}

impl From<Note> for Material {
    fn from(note: Note) -> Self {
        Material::Note(note)
    }
}

impl From<Phrase> for Material {
    fn from(phrase: Phrase) -> Self {
        Material::Phrase(phrase)
    }
}

impl From<Part> for Material {
    fn from(part: Part) -> Self {
        Material::Part(part)
    }
}

impl From<Score> for Material {
    fn from(score: Score) -> Self {
        Material::Score(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencing::notes::{A4, C4, E4, G4};

    #[test]
    fn pitch_and_frequency_stay_consistent() {
        let mut note = Note::new(A4 as i32, 1.0).unwrap();
        assert_eq!(note.frequency(), 440.0);

        note.set_frequency(261.6255653005986).unwrap();
        assert_eq!(note.pitch(), Some(C4));

        note.set_pitch(E4 as i32).unwrap();
        assert_eq!(note.frequency(), pitch_to_frequency(E4));
    }

    #[test]
    fn rests_have_no_pitch() {
        let rest = Note::rest(2.0).unwrap();
        assert!(rest.is_rest());
        assert_eq!(rest.pitch(), None);
        assert_eq!(rest.frequency(), REST);
    }

    #[test]
    fn length_defaults_to_ninety_percent_and_follows_duration() {
        let mut note = Note::new(60, 2.0).unwrap();
        assert!((note.length() - 1.8).abs() < 1e-12);

        note.set_length(1.0).unwrap();
        note.set_duration(4.0).unwrap();
        assert!((note.length() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn invalid_notes_are_rejected() {
        assert_eq!(Note::new(128, 1.0), Err(PlaybackError::PitchOutOfRange(128)));
        assert!(Note::from_frequency(5.0, 1.0).is_err());
        assert!(Note::new(60, -1.0).is_err());
        assert!(Note::new(60, 1.0).unwrap().with_dynamic(200).is_err());
        assert!(Note::new(60, 1.0).unwrap().with_pan(1.5).is_err());
    }

    #[test]
    fn chord_members_have_zero_duration() {
        let mut phrase = Phrase::new();
        phrase.add_chord(&[C4 as i32, E4 as i32, G4 as i32], 2.0).unwrap();

        let durations: Vec<f64> = phrase.notes().iter().map(Note::duration).collect();
        assert_eq!(durations, vec![0.0, 0.0, 2.0]);
        assert_eq!(phrase.beat_length(), 2.0);
    }

    #[test]
    fn note_list_rejects_mismatched_lengths_without_appending() {
        let mut phrase = Phrase::new();
        let err = phrase.add_note_list(&[60, 62, 64], &[1.0, 1.0]).unwrap_err();
        assert_eq!(
            err,
            PlaybackError::MismatchedLengths {
                what: "note durations",
                expected: 3,
                actual: 2
            }
        );
        assert!(phrase.notes().is_empty());

        assert!(phrase.add_note_list(&[60, 200], &[1.0, 1.0]).is_err());
        assert!(phrase.notes().is_empty());
    }

    #[test]
    fn promotion_wraps_one_level_at_a_time() {
        let note = Note::new(60, 1.0).unwrap();
        let Material::Phrase(phrase) = Material::from(note.clone()).promote() else {
            panic!("note should promote to a phrase");
        };
        assert_eq!(phrase.notes(), &[note.clone()]);
        assert_eq!(phrase.start_time(), 0.0);

        let score = Material::from(note).into_score();
        assert_eq!(score.tempo(), DEFAULT_TEMPO);
        assert_eq!(score.parts().len(), 1);
        assert_eq!(score.parts()[0].channel(), 0);
        assert_eq!(score.parts()[0].instrument(), None);
        assert_eq!(score.parts()[0].phrases()[0].notes().len(), 1);
    }

    #[test]
    fn score_promotes_to_itself() {
        let score = Score::new().with_tempo(120.0).unwrap();
        assert_eq!(Material::from(score.clone()).promote(), Material::Score(score));
    }
}
