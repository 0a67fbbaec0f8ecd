use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use super::channels::ChannelNote;
use super::instrument::Instrument;
use super::Engine;
use crate::error::{PlaybackError, Result};
use crate::sequencing::envelope::Envelope;
use crate::sequencing::flatten::{schedule_list, FlatEvent};
use crate::sequencing::material::Material;
use crate::sequencing::pitch::{
    check_channel, check_frequency, check_panning, check_pitch, check_velocity,
    pitch_to_frequency,
};

/*
Playback Scheduling
===================

Playing material never blocks. The score is flattened, every event becomes
timers on the pool, and the call returns. All device traffic happens later
on the timer thread.

  channel backend    start timer  -> program change (if needed), bend, note-on
                     stop timer   -> note-off once nothing else holds the key

  voice backend      start timer  -> allocate a voice, set pan and frequency,
                                     start it, schedule the envelope ramps
                     stop timer   -> stop the voice, give it back

Per event the start timer is scheduled before the stop timer, so with a zero
duration the note still starts before it stops.

Timer callbacks hold only a weak reference to the engine. Once the engine is
gone a late timer does nothing.

Stop
----

stop() is safe to call at any time, any number of times:

  1. every sequence and metronome stops (sequences release their notes)
  2. every pending timer is cancelled
  3. every channel gets all-notes-off and a centred bend; the sounding
     registry is cleared
  4. every registered instrument stops all its voices and frees its pool
*/

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

/// A one-shot note must end at a representable time.
fn check_span(start_ms: u64, duration_ms: u64) -> Result<()> {
    match start_ms.checked_add(duration_ms) {
        Some(_) => Ok(()),
        None => Err(PlaybackError::InvalidTime(start_ms as f64)),
    }
}

impl Engine {
    /// Schedule `material` on the MIDI channels. Returns the number of notes scheduled.
    pub fn play_midi(&self, material: impl Into<Material>) -> usize {
        let events = schedule_list(&material.into().into_score());
        debug!("scheduling {} MIDI note(s)", events.len());
        for event in &events {
            self.schedule_channel_note(ChannelNote::from(event), event.start_ms, event.duration_ms);
        }
        events.len()
    }

    /// Schedule `material` on voice instruments, one instrument per channel.
    ///
    /// `envelopes`, when given, is indexed by channel like `instruments`.
    /// Otherwise each instrument's own envelope is used, or the default one.
    pub fn play_audio(
        &self,
        material: impl Into<Material>,
        instruments: &[Arc<Instrument>],
        envelopes: &[Envelope],
    ) -> Result<usize> {
        let events = schedule_list(&material.into().into_score());

        if let Some(highest) = events.iter().map(|e| e.channel).max() {
            if highest as usize >= instruments.len() {
                return Err(PlaybackError::MissingInstrument {
                    channel: highest,
                    available: instruments.len(),
                });
            }
            if !envelopes.is_empty() && highest as usize >= envelopes.len() {
                return Err(PlaybackError::MismatchedLengths {
                    what: "envelopes",
                    expected: highest as usize + 1,
                    actual: envelopes.len(),
                });
            }
        }

        debug!("scheduling {} audio note(s)", events.len());
        for event in &events {
            let instrument = &instruments[event.channel as usize];
            let envelope = envelopes
                .get(event.channel as usize)
                .cloned()
                .or_else(|| instrument.envelope())
                .unwrap_or_default();
            self.schedule_voice_note(instrument.clone(), event, envelope);
        }
        Ok(events.len())
    }

    /// One MIDI note, `start_ms` from now.
    pub fn note(
        &self,
        pitch: i32,
        start_ms: u64,
        duration_ms: u64,
        velocity: i32,
        channel: u8,
        panning: Option<i32>,
    ) -> Result<()> {
        let pitch = check_pitch(pitch)?;
        self.frequency(
            pitch_to_frequency(pitch),
            start_ms,
            duration_ms,
            velocity,
            channel,
            panning,
        )
    }

    /// One MIDI note at an arbitrary frequency, rendered with pitch bend.
    pub fn frequency(
        &self,
        frequency: f64,
        start_ms: u64,
        duration_ms: u64,
        velocity: i32,
        channel: u8,
        panning: Option<i32>,
    ) -> Result<()> {
        check_span(start_ms, duration_ms)?;
        let note = ChannelNote {
            frequency: check_frequency(frequency)?,
            velocity: check_velocity(velocity)?,
            channel: check_channel(channel)?,
            panning: panning.map(check_panning).transpose()?,
            instrument: None,
        };
        self.schedule_channel_note(note, start_ms, duration_ms);
        Ok(())
    }

    /// One note on a voice instrument, `start_ms` from now.
    ///
    /// Without an explicit envelope the instrument's own (or the default) is used;
    /// without explicit panning the engine default is.
    #[allow(clippy::too_many_arguments)]
    pub fn audio_note(
        &self,
        instrument: &Arc<Instrument>,
        frequency: f64,
        start_ms: u64,
        duration_ms: u64,
        velocity: i32,
        panning: Option<i32>,
        envelope: Option<Envelope>,
    ) -> Result<()> {
        check_span(start_ms, duration_ms)?;
        let event = FlatEvent {
            start_ms,
            duration_ms,
            frequency: check_frequency(frequency)?,
            velocity: check_velocity(velocity)?,
            channel: 0,
            instrument: None,
            panning: match panning {
                Some(panning) => check_panning(panning)?,
                None => self.default_panning(),
            },
        };
        let envelope = envelope
            .or_else(|| instrument.envelope())
            .unwrap_or_default();
        self.schedule_voice_note(instrument.clone(), &event, envelope);
        Ok(())
    }

    pub(crate) fn schedule_channel_note(&self, note: ChannelNote, start_ms: u64, duration_ms: u64) {
        let timers = &self.shared.timers;

        let on = self.weak();
        let note_on = note.clone();
        timers.schedule(ms(start_ms), move || {
            if let Some(shared) = on.upgrade() {
                shared.channels.start_note(&note_on);
            }
        });

        let off = self.weak();
        timers.schedule(ms(start_ms.saturating_add(duration_ms)), move || {
            if let Some(shared) = off.upgrade() {
                shared.channels.stop_note(&note);
            }
        });
    }

    fn schedule_voice_note(&self, instrument: Arc<Instrument>, event: &FlatEvent, envelope: Envelope) {
        let weak = self.weak();
        let frequency = event.frequency;
        let velocity = event.velocity;
        let panning = event.panning;
        let duration_ms = event.duration_ms;

        self.shared.timers.schedule(ms(event.start_ms), move || {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let plan = envelope.compile(velocity, duration_ms as f64);
            let Some(note) =
                instrument.begin_note(frequency, panning, plan.initial_volume(velocity))
            else {
                return;
            };

            for ramp in plan.ramps().iter().copied() {
                let target = instrument.clone();
                shared.timers.schedule(ramp.offset(), move || {
                    target.ramp_note(note, ramp.level, ramp.ramp);
                });
            }

            let target = instrument.clone();
            shared.timers.schedule(ms(duration_ms), move || {
                target.end_note(note);
            });
        });
    }

    /// Stop everything that is playing or scheduled. Never fails.
    pub fn stop(&self) {
        let shared = &self.shared;

        for sequence in shared.sequences() {
            sequence.stop();
        }
        for metronome in shared.metronomes() {
            metronome.halt();
        }

        shared.timers.cancel_all();
        shared.channels.all_notes_off();

        for instrument in shared.instruments() {
            instrument.stop_all();
        }
        info!("stopped all playback");
    }

    /// The stop-everything callback for a host's stop button.
    ///
    /// It does not keep the engine alive; after shutdown it does nothing.
    pub fn stop_hook(&self) -> impl Fn() + Send + Sync + 'static {
        let weak = self.weak();
        move || match weak.upgrade() {
            Some(shared) => Engine { shared }.stop(),
            None => warn!("stop requested but the engine is gone"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::midi::MidiEvent;
    use crate::io::recording::{MidiLog, RecordingDevice, RecordingVoices, VoiceCall};
    use crate::sequencing::material::{Note, Phrase};
    use std::thread::sleep;

    fn engine() -> (Engine, MidiLog) {
        let (device, log) = RecordingDevice::new();
        (Engine::new(device).unwrap(), log)
    }

    #[test]
    fn play_returns_immediately_and_plays_later() {
        let (engine, log) = engine();
        let mut phrase = Phrase::at(1.0).unwrap().with_tempo(600.0).unwrap();
        phrase.add_note_list(&[60, 64], &[1.0, 1.0]).unwrap();

        assert_eq!(engine.play_midi(phrase), 2);
        assert!(log.note_ons().is_empty());

        sleep(Duration::from_millis(400));
        let keys: Vec<u8> = log
            .note_ons()
            .iter()
            .filter_map(|e| match e {
                MidiEvent::NoteOn { key, .. } => Some(*key),
                _ => None,
            })
            .collect();
        assert_eq!(keys, vec![60, 64]);
        assert_eq!(log.note_offs().len(), 2);
    }

    #[test]
    fn one_shot_notes_validate_up_front() {
        let (engine, _) = engine();
        assert!(engine.note(200, 0, 10, 100, 0, None).is_err());
        assert!(engine.note(60, 0, 10, 100, 16, None).is_err());
        assert!(engine.frequency(1.0, 0, 10, 100, 0, None).is_err());
        assert_eq!(engine.timers().pending(), 0);
    }

    #[test]
    fn notes_ending_past_the_clock_are_rejected() {
        let (engine, _) = engine();
        assert!(matches!(
            engine.note(60, u64::MAX, 10, 100, 0, None),
            Err(PlaybackError::InvalidTime(_))
        ));
        assert!(engine.frequency(440.0, 10, u64::MAX, 100, 0, None).is_err());
        assert_eq!(engine.timers().pending(), 0);

        // ending exactly on the last millisecond is still fine
        engine.note(60, u64::MAX - 10, 10, 100, 0, None).unwrap();
        assert_eq!(engine.timers().pending(), 2);
        engine.stop();
    }

    #[test]
    fn stop_cancels_pending_notes_and_is_idempotent() {
        let (engine, log) = engine();
        engine.note(60, 200, 100, 100, 0, None).unwrap();
        engine.note(62, 0, 1000, 100, 0, None).unwrap();
        sleep(Duration::from_millis(50));

        engine.stop();
        engine.stop();
        assert_eq!(engine.timers().pending(), 0);
        assert_eq!(engine.channels().sounding(62, 0), 0);

        sleep(Duration::from_millis(300));
        assert_eq!(log.note_ons().len(), 1);
        assert!(log.note_offs().is_empty());
    }

    #[test]
    fn audio_notes_need_an_instrument_per_channel() {
        let (engine, _) = engine();
        let mut phrase = Phrase::new();
        phrase.add_note(Note::new(60, 1.0).unwrap());
        let mut part = crate::sequencing::material::Part::new(1).unwrap();
        part.add_phrase(phrase);

        let (output, _) = RecordingVoices::new();
        let only = engine.create_instrument("sine", output).unwrap();
        assert_eq!(
            engine.play_audio(part.clone(), &[only.clone()], &[]),
            Err(PlaybackError::MissingInstrument {
                channel: 1,
                available: 1
            })
        );
        assert!(engine
            .play_audio(part, &[only.clone(), only], &[Envelope::default()])
            .is_err());
    }

    #[test]
    fn audio_note_runs_its_envelope_and_frees_the_voice() {
        let (engine, _) = engine();
        let (output, log) = RecordingVoices::new();
        let instrument = engine.create_instrument("sine", output).unwrap();
        let envelope = Envelope::new(vec![10.0], vec![1.0], 10.0, 0.5, 20.0).unwrap();

        engine
            .audio_note(&instrument, 440.0, 0, 100, 100, None, Some(envelope))
            .unwrap();
        sleep(Duration::from_millis(300));

        let volumes: Vec<f32> = log
            .calls_for(0)
            .into_iter()
            .filter_map(|call| match call {
                VoiceCall::SetVolume { volume, .. } => Some(volume),
                _ => None,
            })
            .collect();
        assert_eq!(volumes, vec![0.0, 100.0, 50.0, 0.0]);
        assert_eq!(log.calls_for(0).last(), Some(&VoiceCall::Stop(0)));
        assert_eq!(instrument.active_voices(), 0);
    }

    #[test]
    fn stop_hook_outlives_the_engine_harmlessly() {
        let (engine, _) = engine();
        let hook = engine.stop_hook();
        hook();
        engine.shutdown();
        drop(engine);
        hook();
    }
}
