use log::warn;

use crate::sequencing::material::Score;
use crate::sequencing::pitch::map_range;

/*
Score Flattening
================

Playback never walks the tree at note time. The score is flattened once into a
list of FlatEvents, each one fully resolved: absolute start and sounding length
in milliseconds, frequency, velocity, channel, program and panning.

Timing
------

Tempo and program resolve per phrase:

    phrase setting  >  part setting  >  score tempo / channel's current program

With the phrase's effective tempo:

    ms per beat = 60000 / tempo

    start of note n    = phrase start + sum of durations of notes 0..n
    sounding length    = note length (not duration)

So a note with duration 1.0 and length 0.9 occupies a whole beat of the phrase
but releases a little early. Millisecond values are truncated toward zero.

Rests advance the cursor and are then dropped.

Chords
------

A chord is written as a run of zero-duration notes closed by one note with a
real duration:

    C4 dur 0   E4 dur 0   G4 dur 2.0

All three start together. When grouping, every member of the run takes the
closing note's length, so the chord starts and ends as one.

The list is stably sorted by (start, duration) first. Zero-duration members sort
in front of the note that closes them, and notes tied on both keys keep their
order from the score.
*/

/// One fully resolved note, ready to schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatEvent {
    pub start_ms: u64,
    pub duration_ms: u64,
    pub frequency: f64,
    pub velocity: u8,
    pub channel: u8,
    /// Program to select first; `None` keeps whatever the channel has.
    pub instrument: Option<u8>,
    /// 0..=127
    pub panning: u8,
}

impl FlatEvent {
    pub fn end_ms(&self) -> u64 {
        self.start_ms.saturating_add(self.duration_ms)
    }
}

/// Flatten a score into time-ordered events, rests removed, chords not yet grouped.
pub fn flatten(score: &Score) -> Vec<FlatEvent> {
    let mut events = Vec::new();

    for part in score.parts() {
        for phrase in part.phrases() {
            let tempo = phrase.tempo().or(part.tempo()).unwrap_or(score.tempo());
            let instrument = phrase.instrument().or(part.instrument());
            let ms_per_beat = 60_000.0 / tempo;

            let mut cursor = phrase.start_time();
            for note in phrase.notes() {
                let start = cursor;
                cursor += note.duration();
                if note.is_rest() {
                    continue;
                }
                events.push(FlatEvent {
                    start_ms: (start * ms_per_beat) as u64,
                    duration_ms: (note.length() * ms_per_beat) as u64,
                    frequency: note.frequency(),
                    velocity: note.dynamic(),
                    channel: part.channel(),
                    instrument,
                    panning: map_range(note.pan(), (0.0, 1.0), (0.0, 127.0)) as u8,
                });
            }
        }
    }

    events.sort_by_key(|event| (event.start_ms, event.duration_ms));
    events
}

/// Give every zero-duration chord member the duration of the note closing its run.
///
/// A run still open at the end of the list has nothing to take its duration
/// from; those notes are dropped with a warning.
pub fn group_chords(events: Vec<FlatEvent>) -> Vec<FlatEvent> {
    let mut grouped = Vec::with_capacity(events.len());
    let mut chord: Vec<FlatEvent> = Vec::new();

    for event in events {
        if event.duration_ms == 0 {
            chord.push(event);
            continue;
        }
        for mut member in chord.drain(..) {
            member.duration_ms = event.duration_ms;
            grouped.push(member);
        }
        grouped.push(event);
    }

    if !chord.is_empty() {
        warn!(
            "dropping {} chord note(s) with no closing note at {} ms",
            chord.len(),
            chord[0].start_ms
        );
    }
    grouped
}

/// Flatten and group: the event list a scheduler plays.
pub fn schedule_list(score: &Score) -> Vec<FlatEvent> {
    group_chords(flatten(score))
}
