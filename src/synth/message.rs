#[cfg(feature = "rtrb")]
use rtrb::Consumer;

/// Control messages from the engine side to the audio callback.
///
/// Levels are already normalised: `amplitude` in 0.0..=1.0, `pan` in -1.0..=1.0.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SynthMessage {
    SetFrequency { voice: usize, frequency: f32 },
    SetVolume { voice: usize, amplitude: f32, ramp_secs: f32 },
    SetPan { voice: usize, pan: f32 },
    Play { voice: usize },
    Stop { voice: usize },
    Pause { voice: usize },
    Resume { voice: usize },
}

impl SynthMessage {
    pub fn voice(&self) -> usize {
        match *self {
            SynthMessage::SetFrequency { voice, .. }
            | SynthMessage::SetVolume { voice, .. }
            | SynthMessage::SetPan { voice, .. }
            | SynthMessage::Play { voice }
            | SynthMessage::Stop { voice }
            | SynthMessage::Pause { voice }
            | SynthMessage::Resume { voice } => voice,
        }
    }
}

pub trait MessageReceiver {
    fn pop(&mut self) -> Option<SynthMessage>;
}

#[cfg(feature = "rtrb")]
impl MessageReceiver for Consumer<SynthMessage> {
    fn pop(&mut self) -> Option<SynthMessage> {
        Consumer::pop(self).ok()
    }
}

impl MessageReceiver for std::collections::VecDeque<SynthMessage> {
    fn pop(&mut self) -> Option<SynthMessage> {
        self.pop_front()
    }
}
