//! In-memory devices that record what they are asked to do.
//!
//! Useful for dry runs and for asserting on playback without hardware.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::engine::instrument::VoiceOutput;
use crate::error::Result;
use crate::io::midi::{ChannelDevice, MidiEvent, CC_ALL_NOTES_OFF};

/// Shared view of everything a [`RecordingDevice`] received, with arrival times.
#[derive(Debug, Clone, Default)]
pub struct MidiLog {
    events: Arc<Mutex<Vec<(Instant, MidiEvent)>>>,
}

impl MidiLog {
    pub fn events(&self) -> Vec<MidiEvent> {
        self.events.lock().iter().map(|(_, event)| *event).collect()
    }

    pub fn timed_events(&self) -> Vec<(Instant, MidiEvent)> {
        self.events.lock().clone()
    }

    pub fn note_ons(&self) -> Vec<MidiEvent> {
        self.filtered(|event| matches!(event, MidiEvent::NoteOn { .. }))
    }

    pub fn note_offs(&self) -> Vec<MidiEvent> {
        self.filtered(|event| matches!(event, MidiEvent::NoteOff { .. }))
    }

    /// Everything except the all-notes-off sweep and bend resets of a global stop.
    pub fn without_sweeps(&self) -> Vec<MidiEvent> {
        self.filtered(|event| {
            !matches!(
                event,
                MidiEvent::ControlChange {
                    controller: CC_ALL_NOTES_OFF,
                    ..
                } | MidiEvent::PitchBend { value: 8192, .. }
            )
        })
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn filtered(&self, keep: impl Fn(&MidiEvent) -> bool) -> Vec<MidiEvent> {
        self.events
            .lock()
            .iter()
            .map(|(_, event)| *event)
            .filter(|event| keep(event))
            .collect()
    }
}

/// Channel device that keeps every message in a [`MidiLog`].
#[derive(Debug, Default)]
pub struct RecordingDevice {
    log: MidiLog,
}

impl RecordingDevice {
    pub fn new() -> (Self, MidiLog) {
        let device = Self::default();
        let log = device.log.clone();
        (device, log)
    }
}

impl ChannelDevice for RecordingDevice {
    fn send(&mut self, event: MidiEvent) -> Result<()> {
        self.log.events.lock().push((Instant::now(), event));
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// One call made on a [`VoiceOutput`].
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceCall {
    SetFrequency { voice: usize, frequency: f64 },
    SetVolume { voice: usize, volume: f32, ramp: Duration },
    SetPanning { voice: usize, panning: u8 },
    Play(usize),
    Stop(usize),
    Pause(usize),
    Resume(usize),
}

#[derive(Debug, Clone, Default)]
pub struct VoiceLog {
    calls: Arc<Mutex<Vec<VoiceCall>>>,
}

impl VoiceLog {
    pub fn calls(&self) -> Vec<VoiceCall> {
        self.calls.lock().clone()
    }

    /// Calls addressed to one voice.
    pub fn calls_for(&self, voice: usize) -> Vec<VoiceCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.voice() == voice)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

impl VoiceCall {
    pub fn voice(&self) -> usize {
        match *self {
            VoiceCall::SetFrequency { voice, .. }
            | VoiceCall::SetVolume { voice, .. }
            | VoiceCall::SetPanning { voice, .. }
            | VoiceCall::Play(voice)
            | VoiceCall::Stop(voice)
            | VoiceCall::Pause(voice)
            | VoiceCall::Resume(voice) => voice,
        }
    }
}

/// Voice output that records every call in a [`VoiceLog`].
#[derive(Debug, Default)]
pub struct RecordingVoices {
    log: VoiceLog,
}

impl RecordingVoices {
    pub fn new() -> (Self, VoiceLog) {
        let output = Self::default();
        let log = output.log.clone();
        (output, log)
    }

    fn push(&self, call: VoiceCall) {
        self.log.calls.lock().push(call);
    }
}

impl VoiceOutput for RecordingVoices {
    fn set_frequency(&mut self, voice: usize, frequency: f64) {
        self.push(VoiceCall::SetFrequency { voice, frequency });
    }

    fn set_volume(&mut self, voice: usize, volume: f32, ramp: Duration) {
        self.push(VoiceCall::SetVolume {
            voice,
            volume,
            ramp,
        });
    }

    fn set_panning(&mut self, voice: usize, panning: u8) {
        self.push(VoiceCall::SetPanning { voice, panning });
    }

    fn play(&mut self, voice: usize) {
        self.push(VoiceCall::Play(voice));
    }

    fn stop(&mut self, voice: usize) {
        self.push(VoiceCall::Stop(voice));
    }

    fn pause(&mut self, voice: usize) {
        self.push(VoiceCall::Pause(voice));
    }

    fn resume(&mut self, voice: usize) {
        self.push(VoiceCall::Resume(voice));
    }
}
