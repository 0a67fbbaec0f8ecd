//! accordium - play a short score through a MIDI port or the built-in synth
//!
//! Run with: cargo run -- --help

mod demo;

use std::thread::sleep;
use std::time::Duration;

use accordium::dsp::oscillator::Waveform;
use accordium::io::audio::AudioOutput;
use accordium::io::midi::MidirDevice;
use accordium::io::recording::RecordingDevice;
use accordium::sequencing::schedule_list;
use accordium::{Engine, Metronome, PlaybackConfig, Sequence, TimeSignature};
use clap::{Parser, ValueEnum};
use color_eyre::eyre::{eyre, Result as EyreResult};
use log::{info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Wave {
    Sine,
    Square,
    Triangle,
    Sawtooth,
}

impl From<Wave> for Waveform {
    fn from(wave: Wave) -> Self {
        match wave {
            Wave::Sine => Waveform::Sine,
            Wave::Square => Waveform::Square,
            Wave::Triangle => Waveform::Triangle,
            Wave::Sawtooth => Waveform::Sawtooth,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "accordium", about = "Play a short score on MIDI or oscillator voices")]
struct Args {
    /// Connect to the first MIDI output whose name contains this
    #[arg(short, long)]
    port: Option<String>,

    /// List MIDI output ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Play on the built-in oscillator synth instead of MIDI
    #[arg(long)]
    synth: bool,

    /// Oscillator shape for --synth
    #[arg(long, value_enum, default_value = "triangle")]
    waveform: Wave,

    /// Beats per minute
    #[arg(short, long, default_value_t = 96.0)]
    tempo: f64,

    /// Times to play the score (MIDI only)
    #[arg(short, long, default_value_t = 1)]
    loops: u32,

    /// Run an audible metronome alongside (MIDI only)
    #[arg(short, long)]
    metronome: bool,
}

fn main() -> EyreResult<()> {
    color_eyre::install()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = PlaybackConfig::default();

    if args.list_ports {
        for name in MidirDevice::port_names(&config.midi_client_name)? {
            println!("{name}");
        }
        return Ok(());
    }

    let score = demo::score(args.tempo)?;
    let length_ms = schedule_list(&score)
        .iter()
        .map(|e| e.end_ms())
        .max()
        .ok_or_else(|| eyre!("the score is empty"))?;

    if args.synth {
        play_synth(&args, config, score, length_ms)
    } else {
        play_midi(&args, config, score)
    }
}

fn play_midi(args: &Args, config: PlaybackConfig, score: accordium::Score) -> EyreResult<()> {
    let device = MidirDevice::connect(&config.midi_client_name, args.port.as_deref())?;
    let engine = Engine::with_config(device, config)?;

    let metronome = if args.metronome {
        let metronome = Metronome::new(&engine, args.tempo, TimeSignature::FOUR_FOUR)?;
        metronome.show();
        metronome.sound_on();
        metronome.add(|| info!("bar"), 1, true)?;
        metronome.start()?;
        Some(metronome)
    } else {
        None
    };

    let sequence = Sequence::new(&engine, score);
    let loops = args.loops.max(1);
    if loops > 1 {
        sequence.loop_forever();
    } else {
        sequence.play();
    }
    info!("playing {} note(s), {} time(s)", sequence.events().len(), loops);
    sleep(sequence.length() * loops + Duration::from_millis(200));

    drop(metronome);
    engine.stop();
    engine.shutdown();
    Ok(())
}

fn play_synth(
    args: &Args,
    config: PlaybackConfig,
    score: accordium::Score,
    length_ms: u64,
) -> EyreResult<()> {
    let (output, voices) = AudioOutput::open(config.voices_per_instrument, args.waveform.into())?;

    // No MIDI needed; the channel side just records.
    let engine = match MidirDevice::connect(&config.midi_client_name, args.port.as_deref()) {
        Ok(device) => Engine::with_config(device, config)?,
        Err(err) => {
            warn!("{err}; MIDI traffic will be discarded");
            Engine::with_config(RecordingDevice::new().0, config)?
        }
    };

    let synth = engine.create_instrument("oscillators", voices)?;
    synth.set_envelope(Some(demo::pluck()?));
    output.start()?;

    // Both parts share one bank of voices.
    let notes = engine.play_audio(score, &[synth.clone(), synth.clone()], &[])?;
    info!("playing {notes} note(s) on {} voices", synth.voices());
    sleep(Duration::from_millis(length_ms + 300));

    engine.stop();
    output.stop()?;
    engine.shutdown();
    Ok(())
}
