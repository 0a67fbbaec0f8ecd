use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::Mutex;

use super::channels::ChannelNote;
use super::timer::TimerId;
use super::Engine;
use crate::error::{PlaybackError, Result};
use crate::sequencing::flatten::{schedule_list, FlatEvent};
use crate::sequencing::material::Material;
use crate::sequencing::notes::A4;
use crate::sequencing::pitch::{check_pitch, check_tempo, check_velocity, transpose_frequency};

/*
Sequence
========

A score flattened once and replayed on demand: once, in a loop, paused and
resumed, faster or slower, transposed.

Positions are kept in "score milliseconds", the timeline at the score's own
tempo. Playing at another tempo stretches it:

    wall ms = score ms * default tempo / tempo

Each play pass schedules every event from the current position, plus an end
timer that either loops back to 0 or marks the sequence stopped. A pass
carries a generation number; stopping bumps it, so a timer from an older pass
that fires late does nothing.

Notes that have started but not stopped are kept in `sounding`, with the
frequency they were actually played at, so pausing or stopping can release
exactly those notes even after a transposition.

Transposition and volume apply from the next note on; notes already sounding
keep their pitch. A tempo change reschedules from the current position and
releases what was sounding.
*/

#[derive(Debug, Clone, Copy, PartialEq)]
enum Status {
    Stopped,
    Playing {
        /// score ms at `since`
        from: f64,
        since: Instant,
        looping: bool,
    },
    Paused {
        at: f64,
        looping: bool,
    },
}

struct SequenceState {
    status: Status,
    generation: u64,
    tempo: f64,
    pitch: u8,
    volume: u8,
    timers: Vec<TimerId>,
    sounding: HashMap<usize, ChannelNote>,
}

pub(crate) struct SequenceShared {
    engine: Engine,
    events: Vec<FlatEvent>,
    length_ms: u64,
    default_tempo: f64,
    reference_pitch: u8,
    state: Mutex<SequenceState>,
}

/// A replayable, loopable MIDI sequence.
pub struct Sequence {
    shared: Arc<SequenceShared>,
}

impl Sequence {
    pub fn new(engine: &Engine, material: impl Into<Material>) -> Self {
        let score = material.into().into_score();
        let events = schedule_list(&score);
        let length_ms = events.iter().map(FlatEvent::end_ms).max().unwrap_or(0);
        let default_tempo = score.tempo();

        let shared = Arc::new(SequenceShared {
            engine: engine.clone(),
            events,
            length_ms,
            default_tempo,
            reference_pitch: A4,
            state: Mutex::new(SequenceState {
                status: Status::Stopped,
                generation: 0,
                tempo: default_tempo,
                pitch: A4,
                volume: 127,
                timers: Vec::new(),
                sounding: HashMap::new(),
            }),
        });
        engine.register_sequence(Arc::downgrade(&shared));
        Self { shared }
    }

    /// Play once from the start.
    pub fn play(&self) {
        self.shared.start(false);
    }

    /// Play from the start, looping until stopped.
    pub fn loop_forever(&self) {
        self.shared.start(true);
    }

    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn pause(&self) {
        let mut state = self.shared.state.lock();
        let Status::Playing { looping, .. } = state.status else {
            warn!("sequence is not playing, nothing to pause");
            return;
        };
        let at = self.shared.position(&state);
        self.shared.halt(&mut state);
        state.status = Status::Paused { at, looping };
        debug!("sequence paused at {at:.0} ms");
    }

    pub fn resume(&self) {
        let mut state = self.shared.state.lock();
        let Status::Paused { at, looping } = state.status else {
            warn!("sequence is not paused, nothing to resume");
            return;
        };
        self.shared.run(&mut state, at, looping);
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.shared.state.lock().status, Status::Playing { .. })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.shared.state.lock().status, Status::Paused { .. })
    }

    pub fn set_tempo(&self, tempo: f64) -> Result<()> {
        let tempo = check_tempo(tempo)?;
        // the whole score must still fit in a timer delay at this tempo
        let seconds = self.shared.length_ms as f64 * self.shared.default_tempo / tempo / 1000.0;
        if Duration::try_from_secs_f64(seconds).is_err() {
            return Err(PlaybackError::InvalidTempo(tempo));
        }
        let mut state = self.shared.state.lock();
        match state.status {
            Status::Playing { looping, .. } => {
                let at = self.shared.position(&state);
                self.shared.halt(&mut state);
                state.tempo = tempo;
                self.shared.run(&mut state, at, looping);
            }
            _ => state.tempo = tempo,
        }
        Ok(())
    }

    pub fn tempo(&self) -> f64 {
        self.shared.state.lock().tempo
    }

    /// Tempo of the material the sequence was built from.
    pub fn default_tempo(&self) -> f64 {
        self.shared.default_tempo
    }

    /// Transpose so that the reference pitch (A4) sounds as `pitch`.
    pub fn set_pitch(&self, pitch: i32) -> Result<()> {
        self.shared.state.lock().pitch = check_pitch(pitch)?;
        Ok(())
    }

    pub fn pitch(&self) -> u8 {
        self.shared.state.lock().pitch
    }

    /// Main volume (CC 7) on all sixteen channels.
    pub fn set_volume(&self, volume: i32) -> Result<()> {
        let volume = check_velocity(volume)?;
        self.shared.state.lock().volume = volume;
        for channel in 0..16 {
            self.shared.engine.set_volume(volume as i32, channel)?;
        }
        Ok(())
    }

    pub fn volume(&self) -> u8 {
        self.shared.state.lock().volume
    }

    /// Length of one pass at the default tempo.
    pub fn length(&self) -> Duration {
        Duration::from_millis(self.shared.length_ms)
    }

    pub fn events(&self) -> &[FlatEvent] {
        &self.shared.events
    }
}

impl Drop for Sequence {
    fn drop(&mut self) {
        self.shared.stop();
    }
}

impl SequenceShared {
    fn scale(&self, state: &SequenceState) -> f64 {
        self.default_tempo / state.tempo
    }

    /// Current position in score ms.
    fn position(&self, state: &SequenceState) -> f64 {
        match state.status {
            Status::Playing { from, since, .. } => {
                let played = since.elapsed().as_secs_f64() * 1000.0 / self.scale(state);
                (from + played).min(self.length_ms as f64)
            }
            Status::Paused { at, .. } => at,
            Status::Stopped => 0.0,
        }
    }

    fn start(self: &Arc<Self>, looping: bool) {
        let mut state = self.state.lock();
        self.halt(&mut state);
        self.run(&mut state, 0.0, looping);
    }

    pub(crate) fn stop(&self) {
        let mut state = self.state.lock();
        if state.status != Status::Stopped {
            self.halt(&mut state);
            state.status = Status::Stopped;
        }
    }

    /// Cancel this pass's timers and release its sounding notes.
    fn halt(&self, state: &mut SequenceState) {
        state.generation += 1;
        for id in state.timers.drain(..) {
            self.engine.timers().cancel(id);
        }
        for (_, note) in state.sounding.drain() {
            self.engine.channels().stop_note(&note);
        }
    }

    /// Schedule every event from `from` (score ms) on.
    fn run(self: &Arc<Self>, state: &mut SequenceState, from: f64, looping: bool) {
        let scale = self.scale(state);
        let generation = state.generation;
        let timers = self.engine.timers();
        let wall = |score_ms: f64| {
            Duration::try_from_secs_f64((score_ms - from).max(0.0) * scale / 1000.0)
                .unwrap_or(Duration::MAX)
        };

        for (index, event) in self.events.iter().enumerate() {
            if (event.start_ms as f64) < from {
                continue;
            }
            let on = Arc::downgrade(self);
            state.timers.push(timers.schedule(wall(event.start_ms as f64), move || {
                if let Some(shared) = on.upgrade() {
                    shared.note_on(generation, index);
                }
            }));
            let off = Arc::downgrade(self);
            state.timers.push(timers.schedule(wall(event.end_ms() as f64), move || {
                if let Some(shared) = off.upgrade() {
                    shared.note_off(generation, index);
                }
            }));
        }

        let end: Weak<SequenceShared> = Arc::downgrade(self);
        state.timers.push(timers.schedule(wall(self.length_ms as f64), move || {
            if let Some(shared) = end.upgrade() {
                shared.pass_finished(generation);
            }
        }));

        state.status = Status::Playing {
            from,
            since: Instant::now(),
            looping,
        };
    }

    fn note_on(&self, generation: u64, index: usize) {
        let note = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            let event = &self.events[index];
            let semitones = state.pitch as f64 - self.reference_pitch as f64;
            let mut note = ChannelNote::from(event);
            note.frequency = transpose_frequency(event.frequency, semitones);
            state.sounding.insert(index, note.clone());
            note
        };
        self.engine.channels().start_note(&note);
    }

    fn note_off(&self, generation: u64, index: usize) {
        let note = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.sounding.remove(&index)
        };
        if let Some(note) = note {
            self.engine.channels().stop_note(&note);
        }
    }

    fn pass_finished(self: &Arc<Self>, generation: u64) {
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }
        match state.status {
            Status::Playing { looping: true, .. } => {
                state.timers.clear();
                state.generation += 1;
                self.run(&mut state, 0.0, true);
            }
            _ => {
                state.timers.clear();
                state.status = Status::Stopped;
            }
        }
    }
}
