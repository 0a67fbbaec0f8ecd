//! Voice-based instruments: a fixed pool of oscillator (or sample) voices,
//! each with its own pitch, volume and panning.

use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::config::PAN_CENTER;
use crate::engine::allocator::{PitchKey, VoiceAllocator};
use crate::error::{PlaybackError, Result};
use crate::sequencing::envelope::Envelope;
use crate::sequencing::notes::A4;
use crate::sequencing::pitch::{
    check_frequency, check_panning, check_pitch, check_volume, frequency_to_pitch_and_bend,
    pitch_to_frequency,
};

/// Whatever actually makes the sound for an instrument's voices.
///
/// Volume is on the 0..=127 scale; `ramp` is how long the change should take.
pub trait VoiceOutput: Send {
    fn set_frequency(&mut self, voice: usize, frequency: f64);
    fn set_volume(&mut self, voice: usize, volume: f32, ramp: Duration);
    fn set_panning(&mut self, voice: usize, panning: u8);
    /// Start sounding, looping until stopped.
    fn play(&mut self, voice: usize);
    fn stop(&mut self, voice: usize);
    fn pause(&mut self, voice: usize);
    fn resume(&mut self, voice: usize);
}

/// Last known state of one voice.
#[derive(Debug, Clone, PartialEq)]
pub struct Voice {
    pub pitch: u8,
    pub frequency: f64,
    pub panning: u8,
    pub volume: f32,
    pub playing: bool,
    pub paused: bool,
    pub muted: bool,
}

impl Default for Voice {
    fn default() -> Self {
        Self {
            pitch: A4,
            frequency: pitch_to_frequency(A4),
            panning: PAN_CENTER,
            volume: 127.0,
            playing: false,
            paused: false,
            muted: false,
        }
    }
}

/// A note started by the scheduler: the voice it sounds on, and which use of
/// that voice it is. Ramps and the release only act while the voice is still
/// on the same generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NoteHandle {
    pub(crate) voice: usize,
    generation: u64,
}

struct InstrumentState {
    voices: Vec<Voice>,
    /// Bumped every time a voice starts a note.
    generations: Vec<u64>,
    allocator: VoiceAllocator,
    output: Box<dyn VoiceOutput>,
    envelope: Option<Envelope>,
}

impl InstrumentState {
    fn voice(&mut self, voice: usize) -> Result<&mut Voice> {
        let voices = self.voices.len();
        self.voices
            .get_mut(voice)
            .ok_or(PlaybackError::VoiceOutOfRange { voice, voices })
    }

    fn stop_voice(&mut self, voice: usize) {
        self.output.stop(voice);
        self.voices[voice].playing = false;
        self.voices[voice].paused = false;
    }

    fn send_volume(&mut self, voice: usize, ramp: Duration) {
        let state = &self.voices[voice];
        let volume = if state.muted { 0.0 } else { state.volume };
        self.output.set_volume(voice, volume, ramp);
    }
}

pub struct Instrument {
    name: String,
    state: Mutex<InstrumentState>,
}

impl std::fmt::Debug for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrument")
            .field("name", &self.name)
            .field("voices", &self.voices())
            .finish()
    }
}

impl Instrument {
    pub fn new(
        name: impl Into<String>,
        voices: usize,
        output: impl VoiceOutput + 'static,
    ) -> Result<Self> {
        if voices == 0 {
            return Err(PlaybackError::InvalidVoiceCount(voices));
        }
        Ok(Self {
            name: name.into(),
            state: Mutex::new(InstrumentState {
                voices: vec![Voice::default(); voices],
                generations: vec![0; voices],
                allocator: VoiceAllocator::new(voices),
                output: Box::new(output),
                envelope: None,
            }),
        })
    }

    /// Envelope used by audio playback when none is passed in.
    pub fn with_envelope(self, envelope: Envelope) -> Self {
        self.state.lock().envelope = Some(envelope);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn voices(&self) -> usize {
        self.state.lock().voices.len()
    }

    pub fn voice(&self, voice: usize) -> Result<Voice> {
        self.state.lock().voice(voice).cloned()
    }

    pub fn envelope(&self) -> Option<Envelope> {
        self.state.lock().envelope.clone()
    }

    pub fn set_envelope(&self, envelope: Option<Envelope>) {
        self.state.lock().envelope = envelope;
    }

    /// Start a voice sounding at its current settings.
    pub fn play(&self, voice: usize) -> Result<()> {
        let mut state = self.state.lock();
        let v = state.voice(voice)?;
        v.playing = true;
        v.paused = false;
        state.output.play(voice);
        Ok(())
    }

    pub fn stop(&self, voice: usize) -> Result<()> {
        let mut state = self.state.lock();
        state.voice(voice)?;
        state.stop_voice(voice);
        Ok(())
    }

    /// Silence every voice and forget every pitch binding.
    pub fn stop_all(&self) {
        let mut state = self.state.lock();
        for voice in 0..state.voices.len() {
            if state.voices[voice].playing {
                state.stop_voice(voice);
            }
        }
        state.allocator.reset();
    }

    pub fn pause(&self, voice: usize) -> Result<()> {
        let mut state = self.state.lock();
        let v = state.voice(voice)?;
        if !v.playing || v.paused {
            warn!("{}: voice {voice} is not playing, nothing to pause", self.name);
            return Ok(());
        }
        v.paused = true;
        state.output.pause(voice);
        Ok(())
    }

    pub fn resume(&self, voice: usize) -> Result<()> {
        let mut state = self.state.lock();
        let v = state.voice(voice)?;
        if !v.paused {
            warn!("{}: voice {voice} is not paused, nothing to resume", self.name);
            return Ok(());
        }
        v.paused = false;
        state.output.resume(voice);
        Ok(())
    }

    pub fn is_playing(&self, voice: usize) -> Result<bool> {
        Ok(self.state.lock().voice(voice)?.playing)
    }

    pub fn is_paused(&self, voice: usize) -> Result<bool> {
        Ok(self.state.lock().voice(voice)?.paused)
    }

    /// Glide a voice to `volume` (0..=127) over `ramp`.
    pub fn set_volume(&self, volume: f32, voice: usize, ramp: Duration) -> Result<()> {
        let volume = check_volume(volume)?;
        let mut state = self.state.lock();
        state.voice(voice)?.volume = volume;
        state.send_volume(voice, ramp);
        Ok(())
    }

    pub fn volume(&self, voice: usize) -> Result<f32> {
        Ok(self.state.lock().voice(voice)?.volume)
    }

    /// Mute keeps the stored volume so unmuting restores it.
    pub fn set_muted(&self, muted: bool, voice: usize) -> Result<()> {
        let mut state = self.state.lock();
        state.voice(voice)?.muted = muted;
        state.send_volume(voice, Duration::ZERO);
        Ok(())
    }

    pub fn is_muted(&self, voice: usize) -> Result<bool> {
        Ok(self.state.lock().voice(voice)?.muted)
    }

    pub fn set_panning(&self, panning: i32, voice: usize) -> Result<()> {
        let panning = check_panning(panning)?;
        let mut state = self.state.lock();
        state.voice(voice)?.panning = panning;
        state.output.set_panning(voice, panning);
        Ok(())
    }

    pub fn panning(&self, voice: usize) -> Result<u8> {
        Ok(self.state.lock().voice(voice)?.panning)
    }

    pub fn set_frequency(&self, frequency: f64, voice: usize) -> Result<()> {
        let frequency = check_frequency(frequency)?;
        let mut state = self.state.lock();
        let v = state.voice(voice)?;
        v.frequency = frequency;
        v.pitch = frequency_to_pitch_and_bend(frequency).0.clamp(0, 127) as u8;
        state.output.set_frequency(voice, frequency);
        Ok(())
    }

    pub fn frequency(&self, voice: usize) -> Result<f64> {
        Ok(self.state.lock().voice(voice)?.frequency)
    }

    pub fn set_pitch(&self, pitch: i32, voice: usize) -> Result<()> {
        let pitch = check_pitch(pitch)?;
        self.set_frequency(pitch_to_frequency(pitch), voice)
    }

    pub fn pitch(&self, voice: usize) -> Result<u8> {
        Ok(self.state.lock().voice(voice)?.pitch)
    }

    /// Stop everything and put every voice back to its defaults.
    pub fn reset_voices(&self) {
        self.stop_all();
        let mut state = self.state.lock();
        for voice in 0..state.voices.len() {
            state.voices[voice] = Voice::default();
            let defaults = state.voices[voice].clone();
            state.output.set_frequency(voice, defaults.frequency);
            state.output.set_panning(voice, defaults.panning);
            state.output.set_volume(voice, defaults.volume, Duration::ZERO);
        }
    }

    pub fn allocate(&self, key: impl Into<PitchKey>) -> Option<usize> {
        self.state.lock().allocator.allocate(key)
    }

    pub fn deallocate(&self, key: impl Into<PitchKey>) -> Option<usize> {
        self.state.lock().allocator.deallocate(key)
    }

    pub fn active_voices(&self) -> usize {
        self.state.lock().allocator.active()
    }

    /// Allocate a voice for `frequency` and start it at `volume`.
    ///
    /// Returns `None` when the pool is exhausted; the note is dropped.
    pub(crate) fn begin_note(&self, frequency: f64, panning: u8, volume: u8) -> Option<NoteHandle> {
        let mut state = self.state.lock();
        let Some(voice) = state.allocator.allocate(frequency) else {
            warn!(
                "{}: all {} voices busy, dropping {frequency:.2} Hz",
                self.name,
                state.voices.len()
            );
            return None;
        };
        debug!("{}: voice {voice} <- {frequency:.2} Hz", self.name);

        let v = &mut state.voices[voice];
        v.frequency = frequency;
        v.pitch = frequency_to_pitch_and_bend(frequency).0.clamp(0, 127) as u8;
        v.panning = panning;
        v.volume = volume as f32;
        v.playing = true;
        v.paused = false;

        state.output.set_panning(voice, panning);
        state.output.set_frequency(voice, frequency);
        state.send_volume(voice, Duration::ZERO);
        state.output.play(voice);

        state.generations[voice] += 1;
        Some(NoteHandle {
            voice,
            generation: state.generations[voice],
        })
    }

    fn is_current(state: &InstrumentState, note: NoteHandle) -> bool {
        state.generations.get(note.voice) == Some(&note.generation)
    }

    /// Volume ramp for a sounding note. Ignored once the note has ended or
    /// its voice has moved on to another note.
    pub(crate) fn ramp_note(&self, note: NoteHandle, level: u8, ramp: Duration) {
        let mut state = self.state.lock();
        if !Self::is_current(&state, note) || !state.voices[note.voice].playing {
            debug!("{}: stale ramp for voice {}, ignored", self.name, note.voice);
            return;
        }
        state.voices[note.voice].volume = level as f32;
        state.send_volume(note.voice, ramp);
    }

    /// Stop the note and give its voice back to the pool.
    pub(crate) fn end_note(&self, note: NoteHandle) {
        let mut state = self.state.lock();
        if !Self::is_current(&state, note) {
            debug!("{}: voice {} already released", self.name, note.voice);
            return;
        }
        let frequency = state.voices[note.voice].frequency;
        if state.allocator.voice_for(frequency) == Some(note.voice) {
            state.allocator.deallocate(frequency);
        }
        if state.voices[note.voice].playing {
            state.stop_voice(note.voice);
        }
    }
}
