use std::collections::HashMap;

use log::{debug, trace, warn};
use parking_lot::Mutex;

use crate::error::{PlaybackError, Result};
use crate::io::midi::{ChannelDevice, MidiEvent, CC_ALL_NOTES_OFF, CC_PAN, CC_VOLUME};
use crate::sequencing::flatten::FlatEvent;
use crate::sequencing::pitch::{
    bend_to_wire, check_bend, check_channel, check_frequency, check_instrument, check_panning,
    check_pitch, check_velocity, frequency_to_pitch_and_bend, pitch_to_frequency,
    PITCHBEND_NORMAL,
};

/*
Channel Backend
===============

Sixteen MIDI channels behind one device. Alongside the device the bank keeps:

  bends      Channel-wide bend per channel (zero-centred). Every note-on adds
             its own microtonal bend on top of it.

  sounding   How many note-ons are outstanding per (key, channel). The
             device only hears a note-off when the count drops to zero, so
             overlapping notes on the same key do not cut each other short.

  programs, volumes, pannings
             Last value sent, so they can be read back.

The registry decision is made under the state lock and the device write
happens after it is released. Two note-offs for the same key arriving at the
same moment can therefore race; the worst outcome is one extra note-off on a
key that is already silent.

A frequency that lands between keys is sent as the nearest key plus a bend
message just before the note-on. The bend applies to the whole channel, so
two different microtones sounding together on one channel will detune each
other. Put them on separate channels.
*/

const CHANNELS: usize = 16;

struct ChannelState {
    bends: [i32; CHANNELS],
    programs: [u8; CHANNELS],
    volumes: [u8; CHANNELS],
    pannings: [u8; CHANNELS],
    sounding: HashMap<(u8, u8), usize>,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            bends: [0; CHANNELS],
            programs: [0; CHANNELS],
            volumes: [100; CHANNELS],
            pannings: [64; CHANNELS],
            sounding: HashMap::new(),
        }
    }
}

pub struct ChannelBank {
    device: Mutex<Box<dyn ChannelDevice>>,
    state: Mutex<ChannelState>,
}

impl ChannelBank {
    pub fn new(device: impl ChannelDevice + 'static) -> Self {
        Self {
            device: Mutex::new(Box::new(device)),
            state: Mutex::new(ChannelState::default()),
        }
    }

    pub fn device_name(&self) -> String {
        self.device.lock().name().to_string()
    }

    /// Write to the device. A failed write is logged and dropped.
    fn send(&self, event: MidiEvent) {
        trace!("midi <- {event:?}");
        if let Err(e) = self.device.lock().send(event) {
            warn!("failed to send {event:?}: {e}");
        }
    }

    pub fn note_on(&self, pitch: i32, velocity: i32, channel: u8, panning: Option<i32>) -> Result<()> {
        let pitch = check_pitch(pitch)?;
        self.frequency_on(pitch_to_frequency(pitch), velocity, channel, panning)
    }

    pub fn note_off(&self, pitch: i32, channel: u8) -> Result<()> {
        let pitch = check_pitch(pitch)?;
        self.frequency_off(pitch_to_frequency(pitch), channel)
    }

    /// Sound `frequency` as the nearest key plus a bend.
    pub fn frequency_on(
        &self,
        frequency: f64,
        velocity: i32,
        channel: u8,
        panning: Option<i32>,
    ) -> Result<()> {
        let frequency = check_frequency(frequency)?;
        let velocity = check_velocity(velocity)?;
        let channel = check_channel(channel)?;
        let panning = panning.map(check_panning).transpose()?;

        let (pitch, bend) = frequency_to_pitch_and_bend(frequency);
        self.note_on_pitch_bend(pitch, bend, velocity as i32, channel, panning.map(i32::from))
    }

    pub fn frequency_off(&self, frequency: f64, channel: u8) -> Result<()> {
        let frequency = check_frequency(frequency)?;
        let channel = check_channel(channel)?;
        let (pitch, _) = frequency_to_pitch_and_bend(frequency);
        self.release(pitch as u8, channel);
        Ok(())
    }

    /// Note-on with an explicit bend added to the channel's own.
    ///
    /// The note is registered as sounding before the bend is checked. When the
    /// combined bend is out of range the note-on is skipped with a warning, and
    /// the matching note-off still balances the registration.
    pub fn note_on_pitch_bend(
        &self,
        pitch: i32,
        bend: i32,
        velocity: i32,
        channel: u8,
        panning: Option<i32>,
    ) -> Result<()> {
        let key = check_pitch(pitch)?;
        let velocity = check_velocity(velocity)?;
        let channel = check_channel(channel)?;
        let panning = panning.map(check_panning).transpose()?;

        let combined = {
            let mut state = self.state.lock();
            *state.sounding.entry((key, channel)).or_insert(0) += 1;
            if let Some(panning) = panning {
                state.pannings[channel as usize] = panning;
            }
            bend + state.bends[channel as usize]
        };

        let Some(wire) = bend_to_wire(combined) else {
            warn!("combined bend {combined} out of range on channel {channel}, skipping key {key}");
            return Ok(());
        };

        self.send(MidiEvent::PitchBend {
            channel,
            value: wire,
        });
        if let Some(panning) = panning {
            self.send(MidiEvent::ControlChange {
                channel,
                controller: CC_PAN,
                value: panning,
            });
        }
        self.send(MidiEvent::NoteOn {
            channel,
            key,
            velocity,
        });
        Ok(())
    }

    /// Drop one registration of (key, channel); the device hears a note-off
    /// once none are left.
    fn release(&self, key: u8, channel: u8) {
        let silence = {
            let mut state = self.state.lock();
            match state.sounding.get(&(key, channel)).copied() {
                None => {
                    warn!("key {key} on channel {channel} is not sounding");
                    false
                }
                Some(1) => {
                    state.sounding.remove(&(key, channel));
                    true
                }
                Some(count) => {
                    state.sounding.insert((key, channel), count - 1);
                    false
                }
            }
        };

        if silence {
            self.send(MidiEvent::NoteOff {
                channel,
                key,
                velocity: 0,
            });
        }
    }

    /// Outstanding note-ons for (key, channel).
    pub fn sounding(&self, pitch: u8, channel: u8) -> usize {
        self.state
            .lock()
            .sounding
            .get(&(pitch, channel))
            .copied()
            .unwrap_or(0)
    }

    pub fn set_pitch_bend(&self, bend: i32, channel: u8) -> Result<()> {
        let bend = check_bend(bend)?;
        let channel = check_channel(channel)?;
        self.state.lock().bends[channel as usize] = bend;
        self.send(MidiEvent::PitchBend {
            channel,
            value: (bend + PITCHBEND_NORMAL) as u16,
        });
        Ok(())
    }

    pub fn pitch_bend(&self, channel: u8) -> Result<i32> {
        let channel = check_channel(channel)?;
        Ok(self.state.lock().bends[channel as usize])
    }

    pub fn set_instrument(&self, program: i32, channel: u8) -> Result<()> {
        let program = check_instrument(program)?;
        let channel = check_channel(channel)?;
        self.state.lock().programs[channel as usize] = program;
        self.send(MidiEvent::ProgramChange { channel, program });
        Ok(())
    }

    pub fn instrument(&self, channel: u8) -> Result<u8> {
        let channel = check_channel(channel)?;
        Ok(self.state.lock().programs[channel as usize])
    }

    pub fn set_volume(&self, volume: i32, channel: u8) -> Result<()> {
        let volume = check_velocity(volume)
            .map_err(|_| PlaybackError::VolumeOutOfRange(volume as f32))?;
        let channel = check_channel(channel)?;
        self.state.lock().volumes[channel as usize] = volume;
        self.send(MidiEvent::ControlChange {
            channel,
            controller: CC_VOLUME,
            value: volume,
        });
        Ok(())
    }

    pub fn volume(&self, channel: u8) -> Result<u8> {
        let channel = check_channel(channel)?;
        Ok(self.state.lock().volumes[channel as usize])
    }

    pub fn set_panning(&self, panning: i32, channel: u8) -> Result<()> {
        let panning = check_panning(panning)?;
        let channel = check_channel(channel)?;
        self.state.lock().pannings[channel as usize] = panning;
        self.send(MidiEvent::ControlChange {
            channel,
            controller: CC_PAN,
            value: panning,
        });
        Ok(())
    }

    pub fn panning(&self, channel: u8) -> Result<u8> {
        let channel = check_channel(channel)?;
        Ok(self.state.lock().pannings[channel as usize])
    }

    /// Silence every channel, centre every bend and forget every sounding note.
    pub fn all_notes_off(&self) {
        {
            let mut state = self.state.lock();
            state.sounding.clear();
            state.bends = [0; CHANNELS];
        }
        for channel in 0..CHANNELS as u8 {
            self.send(MidiEvent::ControlChange {
                channel,
                controller: CC_ALL_NOTES_OFF,
                value: 0,
            });
            self.send(MidiEvent::PitchBend {
                channel,
                value: PITCHBEND_NORMAL as u16,
            });
        }
        debug!("all notes off");
    }

    /// Start a scheduled note: program change if it asks for a new one, then the note.
    pub(crate) fn start_note(&self, note: &ChannelNote) {
        if let Some(program) = note.instrument {
            let current = self.state.lock().programs[note.channel as usize];
            if current != program {
                if let Err(e) = self.set_instrument(program as i32, note.channel) {
                    warn!("cannot select program {program}: {e}");
                }
            }
        }
        if let Err(e) = self.frequency_on(
            note.frequency,
            note.velocity as i32,
            note.channel,
            note.panning.map(i32::from),
        ) {
            warn!("skipping {:.2} Hz on channel {}: {e}", note.frequency, note.channel);
        }
    }

    pub(crate) fn stop_note(&self, note: &ChannelNote) {
        if let Err(e) = self.frequency_off(note.frequency, note.channel) {
            warn!("cannot release {:.2} Hz on channel {}: {e}", note.frequency, note.channel);
        }
    }
}

/// What the channel backend needs to start and stop one note.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ChannelNote {
    pub frequency: f64,
    pub velocity: u8,
    pub channel: u8,
    pub panning: Option<u8>,
    pub instrument: Option<u8>,
}

impl From<&FlatEvent> for ChannelNote {
    fn from(event: &FlatEvent) -> Self {
        Self {
            frequency: event.frequency,
            velocity: event.velocity,
            channel: event.channel,
            panning: Some(event.panning),
            instrument: event.instrument,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::recording::{MidiLog, RecordingDevice};

    fn bank() -> (ChannelBank, MidiLog) {
        let (device, log) = RecordingDevice::new();
        (ChannelBank::new(device), log)
    }

    #[test]
    fn overlapping_notes_release_once() {
        let (bank, log) = bank();
        bank.note_on(60, 100, 0, None).unwrap();
        bank.note_on(60, 100, 0, None).unwrap();
        assert_eq!(bank.sounding(60, 0), 2);

        bank.note_off(60, 0).unwrap();
        assert!(log.note_offs().is_empty());

        bank.note_off(60, 0).unwrap();
        assert_eq!(
            log.note_offs(),
            vec![MidiEvent::NoteOff {
                channel: 0,
                key: 60,
                velocity: 0
            }]
        );
        assert_eq!(bank.sounding(60, 0), 0);
    }

    #[test]
    fn extra_note_off_is_only_a_warning() {
        let (bank, log) = bank();
        bank.note_off(60, 0).unwrap();
        assert!(log.is_empty());
    }

    #[test]
    fn microtone_sends_bend_before_note_on() {
        let (bank, log) = bank();
        // a quarter of a semitone above A4
        let frequency = 440.0 * 2f64.powf(0.25 / 12.0);
        bank.frequency_on(frequency, 90, 1, None).unwrap();

        assert_eq!(
            log.events(),
            vec![
                MidiEvent::PitchBend {
                    channel: 1,
                    value: 8192 + 1024
                },
                MidiEvent::NoteOn {
                    channel: 1,
                    key: 69,
                    velocity: 90
                },
            ]
        );
    }

    #[test]
    fn channel_bend_adds_to_note_bend() {
        let (bank, log) = bank();
        bank.set_pitch_bend(4096, 2).unwrap();
        log.clear();

        bank.note_on(60, 100, 2, Some(127)).unwrap();
        assert_eq!(
            log.events(),
            vec![
                MidiEvent::PitchBend {
                    channel: 2,
                    value: 8192 + 4096
                },
                MidiEvent::ControlChange {
                    channel: 2,
                    controller: CC_PAN,
                    value: 127
                },
                MidiEvent::NoteOn {
                    channel: 2,
                    key: 60,
                    velocity: 100
                },
            ]
        );
        assert_eq!(bank.panning(2).unwrap(), 127);
    }

    #[test]
    fn out_of_range_combined_bend_skips_the_note() {
        let (bank, log) = bank();
        bank.set_pitch_bend(8000, 0).unwrap();
        log.clear();

        bank.note_on_pitch_bend(60, 1000, 100, 0, None).unwrap();
        assert!(log.note_ons().is_empty());

        // still registered, so the paired note-off is balanced
        assert_eq!(bank.sounding(60, 0), 1);
        bank.note_off(60, 0).unwrap();
        assert_eq!(log.note_offs().len(), 1);
    }

    #[test]
    fn invalid_input_is_rejected() {
        let (bank, log) = bank();
        assert_eq!(
            bank.note_on(128, 100, 0, None),
            Err(PlaybackError::PitchOutOfRange(128))
        );
        assert!(bank.note_on(60, 128, 0, None).is_err());
        assert!(bank.note_on(60, 100, 16, None).is_err());
        assert!(bank.note_on(60, 100, 0, Some(200)).is_err());
        assert!(bank.frequency_on(20000.0, 100, 0, None).is_err());
        assert!(bank.set_pitch_bend(8192, 0).is_err());
        assert!(bank.set_volume(128, 0).is_err());
        assert!(log.is_empty());
    }

    #[test]
    fn controller_state_reads_back() {
        let (bank, _) = bank();
        bank.set_instrument(40, 3).unwrap();
        bank.set_volume(80, 3).unwrap();
        bank.set_pitch_bend(-100, 3).unwrap();
        assert_eq!(bank.instrument(3).unwrap(), 40);
        assert_eq!(bank.volume(3).unwrap(), 80);
        assert_eq!(bank.pitch_bend(3).unwrap(), -100);
    }

    #[test]
    fn scheduled_notes_change_program_only_when_needed() {
        let (bank, log) = bank();
        let note = ChannelNote {
            frequency: 440.0,
            velocity: 80,
            channel: 0,
            panning: None,
            instrument: Some(0),
        };
        bank.start_note(&note);
        bank.stop_note(&note);
        let organ = ChannelNote {
            instrument: Some(19),
            ..note
        };
        bank.start_note(&organ);

        let programs: Vec<MidiEvent> = log
            .events()
            .into_iter()
            .filter(|e| matches!(e, MidiEvent::ProgramChange { .. }))
            .collect();
        assert_eq!(
            programs,
            vec![MidiEvent::ProgramChange {
                channel: 0,
                program: 19
            }]
        );
        assert_eq!(bank.sounding(69, 0), 1);
    }

    #[test]
    fn all_notes_off_resets_every_channel() {
        let (bank, log) = bank();
        bank.set_pitch_bend(500, 5).unwrap();
        bank.note_on(60, 100, 5, None).unwrap();
        log.clear();

        bank.all_notes_off();
        assert_eq!(bank.sounding(60, 5), 0);
        assert_eq!(bank.pitch_bend(5).unwrap(), 0);
        assert_eq!(log.len(), 32);
        assert!(log.without_sweeps().is_empty());
    }
}
