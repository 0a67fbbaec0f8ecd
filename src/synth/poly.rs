use super::message::{MessageReceiver, SynthMessage};
use super::voice::OscillatorVoice;
use crate::dsp::oscillator::Waveform;

/// Output scale so a full bank of voices stays clear of clipping.
pub const HEADROOM: f32 = 0.25;

/// Audio-thread side of a voice instrument: drains control messages,
/// then renders every voice into one interleaved stereo block.
pub struct OscillatorBank<R: MessageReceiver> {
    voices: Vec<OscillatorVoice>,
    rx: R,
}

impl<R: MessageReceiver> OscillatorBank<R> {
    pub fn new(voices: usize, waveform: Waveform, sample_rate: f32, rx: R) -> Self {
        Self {
            voices: (0..voices)
                .map(|_| OscillatorVoice::new(waveform, sample_rate))
                .collect(),
            rx,
        }
    }

    pub fn voices(&self) -> &[OscillatorVoice] {
        &self.voices
    }

    fn apply(&mut self, msg: SynthMessage) {
        let Some(voice) = self.voices.get_mut(msg.voice()) else {
            return;
        };
        match msg {
            SynthMessage::SetFrequency { frequency, .. } => voice.set_frequency(frequency),
            SynthMessage::SetVolume {
                amplitude,
                ramp_secs,
                ..
            } => voice.set_amplitude(amplitude, ramp_secs),
            SynthMessage::SetPan { pan, .. } => voice.set_pan(pan),
            SynthMessage::Play { .. } => voice.play(),
            SynthMessage::Stop { .. } => voice.stop(),
            SynthMessage::Pause { .. } => voice.pause(),
            SynthMessage::Resume { .. } => voice.resume(),
        }
    }

    /// Render interleaved stereo into `out` (len = frames * 2).
    pub fn render_block(&mut self, out: &mut [f32]) {
        while let Some(msg) = self.rx.pop() {
            self.apply(msg);
        }

        out.fill(0.0);
        for voice in &mut self.voices {
            voice.render_add(out);
        }
        for sample in out.iter_mut() {
            *sample *= HEADROOM;
        }
    }
}
