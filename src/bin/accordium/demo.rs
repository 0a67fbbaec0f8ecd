//! The built-in tune: a short melody over a bass line, with a closing chord.

use accordium::sequencing::notes::{
    C4, DOTTED_QUARTER_NOTE, EIGHTH_NOTE, HALF_NOTE, QUARTER_NOTE, WHOLE_NOTE,
};
use accordium::{Envelope, Note, Part, Phrase, Result, Score};

const MELODY_CHANNEL: u8 = 0;
const BASS_CHANNEL: u8 = 1;

pub fn score(tempo: f64) -> Result<Score> {
    let mut melody = Phrase::new().with_instrument(0)?;
    melody.add_note_list(
        &[C4 as i32, 64, 67, 72, 71, 67],
        &[QUARTER_NOTE, QUARTER_NOTE, QUARTER_NOTE, DOTTED_QUARTER_NOTE, EIGHTH_NOTE, HALF_NOTE],
    )?;
    melody.add_note(Note::rest(QUARTER_NOTE)?);
    melody.add_note(Note::new(69, QUARTER_NOTE)?.with_dynamic(100)?);
    melody.add_chord(&[60, 64, 67, 72], WHOLE_NOTE)?;

    let mut bass = Phrase::new().with_instrument(32)?;
    bass.add_note_list(&[36, 43, 41, 36], &[WHOLE_NOTE, WHOLE_NOTE, HALF_NOTE, HALF_NOTE])?;
    for note in bass.notes_mut() {
        note.set_pan(0.3)?;
    }

    let mut lead = Part::new(MELODY_CHANNEL)?;
    lead.add_phrase(melody);
    let mut low = Part::new(BASS_CHANNEL)?;
    low.add_phrase(bass);

    let mut score = Score::new().with_tempo(tempo)?;
    score.add_part(lead).add_part(low);
    Ok(score)
}

/// Short attack, gentle decay: reads as a pluck on plain oscillators.
pub fn pluck() -> Result<Envelope> {
    Envelope::new(vec![15.0], vec![1.0], 120.0, 0.6, 80.0)
}
