use crate::dsp::oscillator::{Oscillator, Waveform};
use crate::dsp::ramp::LinearRamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// One looping oscillator with a smoothed gain and a stereo position.
#[derive(Debug, Clone)]
pub struct OscillatorVoice {
    oscillator: Oscillator,
    gain: LinearRamp,
    left: f32,
    right: f32,
    state: VoiceState,
    sample_rate: f32,
}

impl OscillatorVoice {
    pub fn new(waveform: Waveform, sample_rate: f32) -> Self {
        let mut voice = Self {
            oscillator: Oscillator::new(waveform, sample_rate),
            gain: LinearRamp::new(0.0),
            left: 0.0,
            right: 0.0,
            state: VoiceState::Stopped,
            sample_rate,
        };
        voice.set_pan(0.0);
        voice
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn set_frequency(&mut self, frequency: f32) {
        self.oscillator.set_frequency(frequency);
    }

    pub fn set_amplitude(&mut self, amplitude: f32, ramp_secs: f32) {
        self.gain.ramp_to(amplitude, ramp_secs, self.sample_rate);
    }

    /// Equal-power pan, -1.0 hard left to 1.0 hard right.
    pub fn set_pan(&mut self, pan: f32) {
        let angle = (pan.clamp(-1.0, 1.0) + 1.0) * std::f32::consts::FRAC_PI_4;
        self.left = angle.cos();
        self.right = angle.sin();
    }

    pub fn play(&mut self) {
        self.oscillator.reset();
        self.state = VoiceState::Playing;
    }

    pub fn stop(&mut self) {
        self.state = VoiceState::Stopped;
    }

    pub fn pause(&mut self) {
        if self.state == VoiceState::Playing {
            self.state = VoiceState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == VoiceState::Paused {
            self.state = VoiceState::Playing;
        }
    }

    /// Mix this voice into an interleaved stereo buffer.
    pub fn render_add(&mut self, out: &mut [f32]) {
        if self.state != VoiceState::Playing {
            return;
        }
        for frame in out.chunks_exact_mut(2) {
            let sample = self.oscillator.next_sample() * self.gain.next_value();
            frame[0] += sample * self.left;
            frame[1] += sample * self.right;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_voice_adds_nothing() {
        let mut voice = OscillatorVoice::new(Waveform::Square, 1000.0);
        voice.set_amplitude(1.0, 0.0);
        let mut out = vec![0.0; 8];
        voice.render_add(&mut out);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn hard_pan_silences_one_side() {
        let mut voice = OscillatorVoice::new(Waveform::Square, 1000.0);
        voice.set_frequency(100.0);
        voice.set_amplitude(1.0, 0.0);
        voice.set_pan(-1.0);
        voice.play();

        let mut out = vec![0.0; 8];
        voice.render_add(&mut out);
        assert!((out[0] - 1.0).abs() < 1e-6);
        assert!(out[1].abs() < 1e-6);
    }

    #[test]
    fn pause_holds_and_resume_continues() {
        let mut voice = OscillatorVoice::new(Waveform::Sawtooth, 1000.0);
        voice.set_amplitude(1.0, 0.0);
        voice.play();
        voice.pause();
        assert_eq!(voice.state(), VoiceState::Paused);

        let mut out = vec![0.0; 4];
        voice.render_add(&mut out);
        assert!(out.iter().all(|s| *s == 0.0));

        voice.resume();
        voice.render_add(&mut out);
        assert!(out.iter().any(|s| *s != 0.0));
    }

    #[test]
    fn resume_does_not_restart_a_stopped_voice() {
        let mut voice = OscillatorVoice::new(Waveform::Sine, 1000.0);
        voice.resume();
        assert_eq!(voice.state(), VoiceState::Stopped);
    }
}
