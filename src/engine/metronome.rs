use std::sync::{Arc, Weak};
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;

use super::timer::TimerId;
use super::Engine;
use crate::error::{PlaybackError, Result};
use crate::sequencing::pitch::{check_channel, check_pitch, check_tempo, check_velocity};
use crate::sequencing::time_signature::TimeSignature;

/*
Metronome
=========

A repeating timer that counts beats (1-indexed, wrapping at the time
signature's numerator) and runs callbacks on chosen beats.

Countdowns
----------

Each callback waits for a number of ticks, computed when it is added from the
beat the next tick will play (`current`) and the beat it wants (`desired`),
with n beats per measure:

    desired = 0               0                      next tick
    current <= desired <= n   desired - current      later this measure
    1 <= desired < current    desired + n - current  next measure
    desired > n               desired - current + n  that far ahead

Every tick:

  1. take the callbacks whose countdown is 0, in the order they were added
  2. drop the non-repeating ones among them
  3. advance the beat
  4. repeating callbacks that just fired get a fresh countdown from the new
     beat; every other countdown goes down by one
  5. print / click if enabled, then run the callbacks from step 1

Bookkeeping happens under the lock, callbacks run after it is released, so a
callback may add or remove callbacks on its own metronome.
*/

/// Handle returned by [`Metronome::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

type BeatCallback = Arc<dyn Fn() + Send + Sync>;

struct Entry {
    id: CallbackId,
    callback: BeatCallback,
    desired_beat: u32,
    repeat: bool,
    countdown: u32,
}

struct MetronomeState {
    tempo: f64,
    time_signature: TimeSignature,
    current_beat: u32,
    entries: Vec<Entry>,
    next_id: u64,
    timer: Option<TimerId>,
    show: bool,
    sound: bool,
    click: Click,
}

/// What an audible metronome plays: key, first-beat velocity, channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Click {
    pub pitch: u8,
    pub volume: u8,
    pub channel: u8,
}

/// Ticks until `desired` comes round, counting from the beat about to play.
fn countdown(desired: u32, current: u32, beats: u32) -> u32 {
    if desired == 0 {
        0
    } else if desired > beats {
        desired - current + beats
    } else if desired >= current {
        desired - current
    } else {
        desired + beats - current
    }
}

fn tick_interval(tempo: f64) -> Result<Duration> {
    let interval = Duration::from_millis((60_000.0 / tempo) as u64);
    if interval.is_zero() {
        return Err(PlaybackError::InvalidInterval);
    }
    Ok(interval)
}

pub(crate) struct MetronomeShared {
    engine: Engine,
    state: Mutex<MetronomeState>,
}

/// Beat counter with scheduled callbacks.
pub struct Metronome {
    shared: Arc<MetronomeShared>,
}

impl Metronome {
    pub fn new(engine: &Engine, tempo: f64, time_signature: TimeSignature) -> Result<Self> {
        let tempo = check_tempo(tempo)?;
        tick_interval(tempo)?;
        let shared = Arc::new(MetronomeShared {
            engine: engine.clone(),
            state: Mutex::new(MetronomeState {
                tempo,
                time_signature,
                current_beat: 1,
                entries: Vec::new(),
                next_id: 0,
                timer: None,
                show: false,
                sound: false,
                click: Click {
                    pitch: engine.config().click_pitch,
                    volume: engine.config().click_volume,
                    channel: engine.config().click_channel,
                },
            }),
        });
        engine.register_metronome(Arc::downgrade(&shared));
        Ok(Self { shared })
    }

    /// Run `callback` on `desired_beat` (0 = next tick), once or every time
    /// that beat comes round.
    pub fn add<F>(&self, callback: F, desired_beat: i32, repeat: bool) -> Result<CallbackId>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let desired_beat =
            u32::try_from(desired_beat).map_err(|_| PlaybackError::NegativeBeat(desired_beat))?;

        let mut state = self.shared.state.lock();
        let id = CallbackId(state.next_id);
        state.next_id += 1;
        let countdown = countdown(
            desired_beat,
            state.current_beat,
            state.time_signature.numerator() as u32,
        );
        state.entries.push(Entry {
            id,
            callback: Arc::new(callback),
            desired_beat,
            repeat,
            countdown,
        });
        Ok(id)
    }

    /// Ticks left before callback `id` runs.
    pub fn countdown(&self, id: CallbackId) -> Option<u32> {
        self.shared
            .state
            .lock()
            .entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.countdown)
    }

    pub fn remove(&self, id: CallbackId) -> bool {
        let mut state = self.shared.state.lock();
        let before = state.entries.len();
        state.entries.retain(|entry| entry.id != id);
        let removed = state.entries.len() != before;
        if !removed {
            warn!("metronome callback {id:?} is not registered");
        }
        removed
    }

    pub fn remove_all(&self) {
        self.shared.state.lock().entries.clear();
    }

    pub fn callbacks(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    pub fn start(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.timer.is_some() {
            warn!("metronome is already running");
            return Ok(());
        }
        let interval = tick_interval(state.tempo)?;
        let weak: Weak<MetronomeShared> = Arc::downgrade(&self.shared);
        let id = self
            .shared
            .engine
            .timers()
            .schedule_repeating(interval, move || {
                if let Some(shared) = weak.upgrade() {
                    shared.tick();
                }
            })?;
        state.timer = Some(id);
        debug!("metronome started at {} BPM", state.tempo);
        Ok(())
    }

    pub fn stop(&self) {
        if !self.shared.halt() {
            warn!("metronome is already stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().timer.is_some()
    }

    /// Run one tick now. The repeating timer calls this on every beat.
    pub fn tick(&self) {
        self.shared.tick();
    }

    pub fn set_tempo(&self, tempo: f64) -> Result<()> {
        let tempo = check_tempo(tempo)?;
        let interval = tick_interval(tempo)?;
        let mut state = self.shared.state.lock();
        state.tempo = tempo;
        if let Some(id) = state.timer {
            self.shared.engine.timers().set_interval(id, interval)?;
        }
        Ok(())
    }

    pub fn tempo(&self) -> f64 {
        self.shared.state.lock().tempo
    }

    /// Change the meter. Counting restarts from beat 1 and pending countdowns
    /// are recomputed against the new measure.
    pub fn set_time_signature(&self, time_signature: TimeSignature) {
        let mut state = self.shared.state.lock();
        state.time_signature = time_signature;
        state.current_beat = 1;
        let beats = time_signature.numerator() as u32;
        for entry in state.entries.iter_mut() {
            entry.countdown = countdown(entry.desired_beat, 1, beats);
        }
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.shared.state.lock().time_signature
    }

    /// Beat the next tick will play.
    pub fn current_beat(&self) -> u32 {
        self.shared.state.lock().current_beat
    }

    /// Print each beat number as it is played.
    pub fn show(&self) {
        self.shared.state.lock().show = true;
    }

    pub fn hide(&self) {
        self.shared.state.lock().show = false;
    }

    /// Click on every beat, accented on beat 1.
    pub fn sound_on(&self) {
        self.shared.state.lock().sound = true;
    }

    /// Click with this metronome's own key, first-beat velocity and channel.
    pub fn sound_on_with(&self, pitch: i32, volume: i32, channel: u8) -> Result<()> {
        let click = Click {
            pitch: check_pitch(pitch)?,
            volume: check_velocity(volume)?,
            channel: check_channel(channel)?,
        };
        let mut state = self.shared.state.lock();
        state.click = click;
        state.sound = true;
        Ok(())
    }

    pub fn click(&self) -> Click {
        self.shared.state.lock().click
    }

    pub fn sound_off(&self) {
        self.shared.state.lock().sound = false;
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        self.shared.halt();
    }
}

impl MetronomeShared {
    /// Cancel the tick timer. Returns whether it was running.
    pub(crate) fn halt(&self) -> bool {
        let timer = self.state.lock().timer.take();
        match timer {
            Some(id) => {
                self.engine.timers().cancel(id);
                true
            }
            None => false,
        }
    }

    fn tick(&self) {
        let (beat, due, show, sound) = {
            let mut state = self.state.lock();
            let beat = state.current_beat;
            let beats = state.time_signature.numerator() as u32;

            let due: Vec<BeatCallback> = state
                .entries
                .iter()
                .filter(|entry| entry.countdown == 0)
                .map(|entry| entry.callback.clone())
                .collect();
            state
                .entries
                .retain(|entry| entry.countdown != 0 || entry.repeat);

            let next = state.time_signature.next_beat(beat);
            state.current_beat = next;
            for entry in state.entries.iter_mut() {
                entry.countdown = match entry.countdown {
                    0 => countdown(entry.desired_beat, next, beats),
                    n => n - 1,
                };
            }
            (beat, due, state.show, state.sound.then_some(state.click))
        };

        if show {
            println!("{beat}");
        }
        if let Some(click) = sound {
            self.play_click(click, beat);
        }
        for callback in due {
            callback();
        }
    }

    fn play_click(&self, click: Click, beat: u32) {
        let config = self.engine.config();
        if let Err(e) = self.engine.note(
            click.pitch as i32,
            0,
            config.click_length_ms,
            config.accented_velocity(click.volume, beat) as i32,
            click.channel,
            None,
        ) {
            warn!("metronome click failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::midi::MidiEvent;
    use crate::io::recording::RecordingDevice;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn metronome(tempo: f64, ts: TimeSignature) -> Metronome {
        let (device, _) = RecordingDevice::new();
        let engine = Engine::new(device).unwrap();
        Metronome::new(&engine, tempo, ts).unwrap()
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        (count, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn countdown_formula() {
        assert_eq!(countdown(0, 3, 4), 0);
        assert_eq!(countdown(3, 1, 4), 2);
        assert_eq!(countdown(3, 4, 4), 3);
        assert_eq!(countdown(4, 4, 4), 0);
        assert_eq!(countdown(6, 2, 4), 8);
    }

    #[test]
    fn desired_beat_three_from_beat_one_and_four() {
        let m = metronome(60.0, TimeSignature::FOUR_FOUR);
        let (_, cb) = counter();
        let id = m.add(cb, 3, false).unwrap();
        assert_eq!(m.countdown(id), Some(2));

        for _ in 0..3 {
            m.tick();
        }
        assert_eq!(m.current_beat(), 4);
        let (_, cb) = counter();
        let id = m.add(cb, 3, false).unwrap();
        assert_eq!(m.countdown(id), Some(3));
    }

    #[test]
    fn one_shot_fires_on_its_beat_then_goes_away() {
        let m = metronome(60.0, TimeSignature::FOUR_FOUR);
        let (count, cb) = counter();
        m.add(cb, 3, false).unwrap();

        m.tick(); // beat 1
        m.tick(); // beat 2
        assert_eq!(count.load(Ordering::SeqCst), 0);
        m.tick(); // beat 3
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(m.callbacks(), 0);

        for _ in 0..8 {
            m.tick();
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn repeating_callback_fires_once_per_measure() {
        let m = metronome(60.0, TimeSignature::THREE_FOUR);
        let (count, cb) = counter();
        m.add(cb, 1, true).unwrap();

        for _ in 0..9 {
            m.tick();
        }
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn beat_zero_repeating_fires_every_tick() {
        let m = metronome(60.0, TimeSignature::FOUR_FOUR);
        let (count, cb) = counter();
        m.add(cb, 0, true).unwrap();
        for _ in 0..5 {
            m.tick();
        }
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn beyond_the_measure_counts_raw_beats() {
        let m = metronome(60.0, TimeSignature::FOUR_FOUR);
        let (count, cb) = counter();
        let id = m.add(cb, 6, false).unwrap();
        assert_eq!(m.countdown(id), Some(9));
        for _ in 0..9 {
            m.tick();
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);
        m.tick();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn negative_beat_is_rejected() {
        let m = metronome(60.0, TimeSignature::FOUR_FOUR);
        assert_eq!(
            m.add(|| {}, -1, false).unwrap_err(),
            PlaybackError::NegativeBeat(-1)
        );
    }

    #[test]
    fn remove_by_id() {
        let m = metronome(60.0, TimeSignature::FOUR_FOUR);
        let (count, cb) = counter();
        let id = m.add(cb, 0, true).unwrap();
        assert!(m.remove(id));
        assert!(!m.remove(id));
        m.tick();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn time_signature_change_restarts_the_measure() {
        let m = metronome(60.0, TimeSignature::FOUR_FOUR);
        m.tick();
        m.tick();
        let (_, cb) = counter();
        let id = m.add(cb, 2, true).unwrap();
        m.set_time_signature(TimeSignature::THREE_FOUR);
        assert_eq!(m.current_beat(), 1);
        assert_eq!(m.countdown(id), Some(1));
    }

    #[test]
    fn start_stop_and_tempo() {
        let m = metronome(600.0, TimeSignature::FOUR_FOUR);
        let (count, cb) = counter();
        m.add(cb, 0, true).unwrap();

        m.start().unwrap();
        m.start().unwrap();
        assert!(m.is_running());
        std::thread::sleep(Duration::from_millis(350));
        m.stop();
        m.stop();
        assert!(!m.is_running());

        let ticks = count.load(Ordering::SeqCst);
        assert!((2..=4).contains(&ticks), "{ticks} ticks");

        assert!(m.set_tempo(0.0).is_err());
        m.set_tempo(120.0).unwrap();
        assert_eq!(m.tempo(), 120.0);
    }

    #[test]
    fn single_beat_measure_ticks_on_beat_one() {
        assert!(TimeSignature::new(0, 4).is_err());

        let m = metronome(60.0, TimeSignature::new(1, 4).unwrap());
        let (count, cb) = counter();
        m.add(cb, 1, true).unwrap();
        for _ in 0..4 {
            m.tick();
            assert_eq!(m.current_beat(), 1);
        }
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn each_metronome_picks_its_own_click() {
        let (device, log) = RecordingDevice::new();
        let engine = Engine::new(device).unwrap();
        let m = Metronome::new(&engine, 60.0, TimeSignature::FOUR_FOUR).unwrap();

        assert!(m.sound_on_with(128, 100, 9).is_err());
        assert!(m.sound_on_with(76, -1, 9).is_err());
        assert!(m.sound_on_with(76, 100, 16).is_err());

        m.sound_on_with(76, 100, 9).unwrap();
        assert_eq!(
            m.click(),
            Click {
                pitch: 76,
                volume: 100,
                channel: 9
            }
        );

        m.tick();
        std::thread::sleep(Duration::from_millis(50));
        let ons = log.note_ons();
        assert_eq!(
            ons.first(),
            Some(&MidiEvent::NoteOn {
                channel: 9,
                key: 76,
                velocity: 100
            })
        );
        engine.stop();
    }
}
