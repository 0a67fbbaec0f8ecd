use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{error, info};
use rtrb::Consumer;

use crate::dsp::oscillator::Waveform;
use crate::error::{PlaybackError, Result};
use crate::synth::{oscillator_bank, OscillatorBank, SynthMessage, SynthVoices};
use crate::MAX_BLOCK_SIZE;

/*
Audio Output
============

Hosts an oscillator bank on the default output device. The bank renders
stereo in blocks of at most MAX_BLOCK_SIZE frames; the callback then spreads
those frames over however many channels the device has:

    1 channel     (L + R) / 2
    2 channels    L, R
    more          L, R, then silence

The stream is created paused. Call start() before scheduling notes.
*/

fn device_error(err: impl std::fmt::Display) -> PlaybackError {
    PlaybackError::Device(err.to_string())
}

pub struct AudioOutput {
    stream: cpal::Stream,
    sample_rate: f32,
    channels: usize,
}

impl AudioOutput {
    /// Open the default output device and connect a new bank of `voices`
    /// oscillators to it. Returns the control side for an `Instrument`.
    pub fn open(voices: usize, waveform: Waveform) -> Result<(Self, SynthVoices)> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlaybackError::Device("no default output device available".into()))?;
        let config = device.default_output_config().map_err(device_error)?;

        let sample_rate = config.sample_rate().0 as f32;
        let channels = config.channels() as usize;
        let (control, bank) = oscillator_bank(voices, waveform, sample_rate);
        let stream = Self::build(&device, &config.into(), channels, bank)?;
        stream.pause().map_err(device_error)?;

        info!(
            "audio output on {} ({} Hz, {} channel(s))",
            device.name().unwrap_or_else(|_| "unknown device".into()),
            sample_rate,
            channels
        );

        Ok((
            Self {
                stream,
                sample_rate,
                channels,
            },
            control,
        ))
    }

    fn build(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        channels: usize,
        mut bank: OscillatorBank<Consumer<SynthMessage>>,
    ) -> Result<cpal::Stream> {
        let mut stereo = vec![0.0f32; MAX_BLOCK_SIZE * 2];

        device
            .build_output_stream(
                config,
                move |data: &mut [f32], _| {
                    for out in data.chunks_mut(MAX_BLOCK_SIZE * channels) {
                        let frames = out.len() / channels;
                        let block = &mut stereo[..frames * 2];
                        bank.render_block(block);

                        for (frame, lr) in out.chunks_exact_mut(channels).zip(block.chunks_exact(2)) {
                            match frame.len() {
                                1 => frame[0] = (lr[0] + lr[1]) * 0.5,
                                _ => {
                                    frame[0] = lr[0];
                                    frame[1] = lr[1];
                                    frame[2..].fill(0.0);
                                }
                            }
                        }
                    }
                },
                |err| error!("audio stream error: {err}"),
                None,
            )
            .map_err(device_error)
    }

    pub fn start(&self) -> Result<()> {
        self.stream.play().map_err(device_error)
    }

    pub fn stop(&self) -> Result<()> {
        self.stream.pause().map_err(device_error)
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }
}
