//! Oscillator voices for voice instruments.
//!
//! The engine side holds [`SynthVoices`], which implements
//! [`VoiceOutput`](crate::engine::instrument::VoiceOutput) by pushing
//! [`SynthMessage`]s into a lock-free ring. The audio callback owns the
//! matching [`OscillatorBank`] and drains the ring at the start of each block.

pub mod message;
pub mod poly;
pub mod voice;

pub use message::{MessageReceiver, SynthMessage};
pub use poly::OscillatorBank;
pub use voice::{OscillatorVoice, VoiceState};

#[cfg(feature = "rtrb")]
pub use ring::{oscillator_bank, SynthVoices};

#[cfg(feature = "rtrb")]
mod ring {
    use std::time::Duration;

    use log::warn;
    use rtrb::{Consumer, Producer, RingBuffer};

    use super::{OscillatorBank, SynthMessage};
    use crate::dsp::oscillator::Waveform;
    use crate::engine::instrument::VoiceOutput;
    use crate::sequencing::pitch::map_range;

    const QUEUE_CAPACITY: usize = 1024;

    pub struct SynthVoices {
        tx: Producer<SynthMessage>,
    }

    impl SynthVoices {
        fn send(&mut self, msg: SynthMessage) {
            if self.tx.push(msg).is_err() {
                warn!("synth queue full, dropped {msg:?}");
            }
        }
    }

    impl VoiceOutput for SynthVoices {
        fn set_frequency(&mut self, voice: usize, frequency: f64) {
            self.send(SynthMessage::SetFrequency {
                voice,
                frequency: frequency as f32,
            });
        }

        fn set_volume(&mut self, voice: usize, volume: f32, ramp: Duration) {
            self.send(SynthMessage::SetVolume {
                voice,
                amplitude: volume / 127.0,
                ramp_secs: ramp.as_secs_f32(),
            });
        }

        fn set_panning(&mut self, voice: usize, panning: u8) {
            self.send(SynthMessage::SetPan {
                voice,
                pan: map_range(panning as f64, (0.0, 127.0), (-1.0, 1.0)) as f32,
            });
        }

        fn play(&mut self, voice: usize) {
            self.send(SynthMessage::Play { voice });
        }

        fn stop(&mut self, voice: usize) {
            self.send(SynthMessage::Stop { voice });
        }

        fn pause(&mut self, voice: usize) {
            self.send(SynthMessage::Pause { voice });
        }

        fn resume(&mut self, voice: usize) {
            self.send(SynthMessage::Resume { voice });
        }
    }

    /// A connected pair: the control side for an `Instrument`, and the bank
    /// to render from the audio callback.
    pub fn oscillator_bank(
        voices: usize,
        waveform: Waveform,
        sample_rate: f32,
    ) -> (SynthVoices, OscillatorBank<Consumer<SynthMessage>>) {
        let (tx, rx) = RingBuffer::new(QUEUE_CAPACITY);
        (
            SynthVoices { tx },
            OscillatorBank::new(voices, waveform, sample_rate, rx),
        )
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::synth::VoiceState;

        #[test]
        fn instrument_calls_reach_the_bank() {
            let (mut control, mut bank) = oscillator_bank(2, Waveform::Sine, 1000.0);
            control.set_frequency(0, 220.0);
            control.set_volume(0, 127.0, Duration::ZERO);
            control.set_panning(0, 127);
            control.play(0);

            let mut out = vec![0.0; 16];
            bank.render_block(&mut out);
            assert_eq!(bank.voices()[0].state(), VoiceState::Playing);
            assert_eq!(bank.voices()[1].state(), VoiceState::Stopped);
            // hard right
            assert!(out.chunks(2).all(|frame| frame[0].abs() < 1e-6));
            assert!(out.chunks(2).any(|frame| frame[1] != 0.0));
        }
    }
}
