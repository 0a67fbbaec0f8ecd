// Purpose: the playback context. Owns the timer pool, the MIDI channels and
// the registries of everything a global stop has to reach.

pub mod allocator;
pub mod channels;
pub mod instrument;
pub mod metronome;
pub mod scheduler;
pub mod sequence;
pub mod timer;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use log::info;
use parking_lot::Mutex;

use self::channels::ChannelBank;
use self::instrument::{Instrument, VoiceOutput};
use self::metronome::MetronomeShared;
use self::sequence::SequenceShared;
use self::timer::TimerPool;
use crate::config::PlaybackConfig;
use crate::error::Result;
use crate::io::midi::ChannelDevice;
use crate::sequencing::pitch::check_panning;

pub use self::instrument::Voice;
pub use self::metronome::{CallbackId, Click, Metronome};
pub use self::sequence::Sequence;
pub use self::timer::TimerId;

pub(crate) struct Shared {
    pub(crate) config: PlaybackConfig,
    pub(crate) timers: TimerPool,
    pub(crate) channels: ChannelBank,
    default_panning: AtomicU8,
    instruments: Mutex<Vec<Weak<Instrument>>>,
    metronomes: Mutex<Vec<Weak<MetronomeShared>>>,
    sequences: Mutex<Vec<Weak<SequenceShared>>>,
}

/// Handle to one playback context. Cheap to clone; every clone drives the
/// same timers and channels.
///
/// Independent engines share nothing, so tests can run several side by side.
#[derive(Clone)]
pub struct Engine {
    pub(crate) shared: Arc<Shared>,
}

impl Engine {
    pub fn new(device: impl ChannelDevice + 'static) -> Result<Self> {
        Self::with_config(device, PlaybackConfig::default())
    }

    pub fn with_config(device: impl ChannelDevice + 'static, config: PlaybackConfig) -> Result<Self> {
        config.validate()?;
        let channels = ChannelBank::new(device);
        info!(
            "engine started on '{}' ({} voices per instrument)",
            channels.device_name(),
            config.voices_per_instrument
        );
        Ok(Self {
            shared: Arc::new(Shared {
                default_panning: AtomicU8::new(config.default_panning),
                config,
                timers: TimerPool::new()?,
                channels,
                instruments: Mutex::new(Vec::new()),
                metronomes: Mutex::new(Vec::new()),
                sequences: Mutex::new(Vec::new()),
            }),
        })
    }

    pub(crate) fn weak(&self) -> Weak<Shared> {
        Arc::downgrade(&self.shared)
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.shared.config
    }

    pub fn timers(&self) -> &TimerPool {
        &self.shared.timers
    }

    /// Direct access to the MIDI channels: notes, bends, programs, controllers.
    pub fn channels(&self) -> &ChannelBank {
        &self.shared.channels
    }

    /// New voice instrument with the configured pool size, known to global stop.
    pub fn create_instrument(
        &self,
        name: impl Into<String>,
        output: impl VoiceOutput + 'static,
    ) -> Result<Arc<Instrument>> {
        Ok(self.register_instrument(Instrument::new(
            name,
            self.shared.config.voices_per_instrument,
            output,
        )?))
    }

    pub fn register_instrument(&self, instrument: Instrument) -> Arc<Instrument> {
        let instrument = Arc::new(instrument);
        register(&self.shared.instruments, Arc::downgrade(&instrument));
        instrument
    }

    pub(crate) fn register_metronome(&self, metronome: Weak<MetronomeShared>) {
        register(&self.shared.metronomes, metronome);
    }

    pub(crate) fn register_sequence(&self, sequence: Weak<SequenceShared>) {
        register(&self.shared.sequences, sequence);
    }

    /// Panning for voice notes that do not bring their own.
    pub fn default_panning(&self) -> u8 {
        self.shared.default_panning.load(Ordering::Relaxed)
    }

    pub fn set_default_panning(&self, panning: i32) -> Result<()> {
        let panning = check_panning(panning)?;
        self.shared.default_panning.store(panning, Ordering::Relaxed);
        Ok(())
    }

    pub fn note_on(&self, pitch: i32, velocity: i32, channel: u8, panning: Option<i32>) -> Result<()> {
        self.channels().note_on(pitch, velocity, channel, panning)
    }

    pub fn note_off(&self, pitch: i32, channel: u8) -> Result<()> {
        self.channels().note_off(pitch, channel)
    }

    pub fn frequency_on(
        &self,
        frequency: f64,
        velocity: i32,
        channel: u8,
        panning: Option<i32>,
    ) -> Result<()> {
        self.channels().frequency_on(frequency, velocity, channel, panning)
    }

    pub fn frequency_off(&self, frequency: f64, channel: u8) -> Result<()> {
        self.channels().frequency_off(frequency, channel)
    }

    pub fn note_on_pitch_bend(
        &self,
        pitch: i32,
        bend: i32,
        velocity: i32,
        channel: u8,
        panning: Option<i32>,
    ) -> Result<()> {
        self.channels()
            .note_on_pitch_bend(pitch, bend, velocity, channel, panning)
    }

    pub fn set_pitch_bend(&self, bend: i32, channel: u8) -> Result<()> {
        self.channels().set_pitch_bend(bend, channel)
    }

    pub fn pitch_bend(&self, channel: u8) -> Result<i32> {
        self.channels().pitch_bend(channel)
    }

    pub fn set_instrument(&self, program: i32, channel: u8) -> Result<()> {
        self.channels().set_instrument(program, channel)
    }

    pub fn instrument(&self, channel: u8) -> Result<u8> {
        self.channels().instrument(channel)
    }

    pub fn set_volume(&self, volume: i32, channel: u8) -> Result<()> {
        self.channels().set_volume(volume, channel)
    }

    pub fn volume(&self, channel: u8) -> Result<u8> {
        self.channels().volume(channel)
    }

    pub fn set_panning(&self, panning: i32, channel: u8) -> Result<()> {
        self.channels().set_panning(panning, channel)
    }

    pub fn panning(&self, channel: u8) -> Result<u8> {
        self.channels().panning(channel)
    }

    pub fn all_notes_off(&self) {
        self.channels().all_notes_off();
    }

    /// Stop everything, then shut down the timer thread and forget every
    /// registered instrument, metronome and sequence.
    pub fn shutdown(&self) {
        self.stop();
        self.shared.timers.shutdown();
        self.shared.instruments.lock().clear();
        self.shared.metronomes.lock().clear();
        self.shared.sequences.lock().clear();
        info!("engine shut down");
    }
}

impl Shared {
    pub(crate) fn instruments(&self) -> Vec<Arc<Instrument>> {
        live(&self.instruments)
    }

    pub(crate) fn metronomes(&self) -> Vec<Arc<MetronomeShared>> {
        live(&self.metronomes)
    }

    pub(crate) fn sequences(&self) -> Vec<Arc<SequenceShared>> {
        live(&self.sequences)
    }
}

fn register<T>(registry: &Mutex<Vec<Weak<T>>>, item: Weak<T>) {
    let mut registry = registry.lock();
    registry.retain(|entry| entry.strong_count() > 0);
    registry.push(item);
}

fn live<T>(registry: &Mutex<Vec<Weak<T>>>) -> Vec<Arc<T>> {
    registry.lock().iter().filter_map(Weak::upgrade).collect()
}
