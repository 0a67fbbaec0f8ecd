use log::info;
use midir::{MidiOutput, MidiOutputConnection};

use crate::error::{PlaybackError, Result};

pub const CC_VOLUME: u8 = 7;
pub const CC_PAN: u8 = 10;
pub const CC_ALL_NOTES_OFF: u8 = 123;

/// Channel message as written to a device. Pitch bend is the unsigned 14-bit
/// wire value, centred on 8192.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { channel: u8, key: u8, velocity: u8 },
    NoteOff { channel: u8, key: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    PitchBend { channel: u8, value: u16 },
    ProgramChange { channel: u8, program: u8 },
}

impl MidiEvent {
    pub fn channel(&self) -> u8 {
        match *self {
            MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::ControlChange { channel, .. }
            | MidiEvent::PitchBend { channel, .. }
            | MidiEvent::ProgramChange { channel, .. } => channel,
        }
    }

    /// Raw message bytes: status then one or two data bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            MidiEvent::NoteOn {
                channel,
                key,
                velocity,
            } => vec![0x90 | (channel & 0x0F), key & 0x7F, velocity & 0x7F],
            MidiEvent::NoteOff {
                channel,
                key,
                velocity,
            } => vec![0x80 | (channel & 0x0F), key & 0x7F, velocity & 0x7F],
            MidiEvent::ControlChange {
                channel,
                controller,
                value,
            } => vec![0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F],
            MidiEvent::PitchBend { channel, value } => {
                let lsb = (value & 0x7F) as u8;
                let msb = ((value >> 7) & 0x7F) as u8;
                vec![0xE0 | (channel & 0x0F), lsb, msb]
            }
            MidiEvent::ProgramChange { channel, program } => {
                vec![0xC0 | (channel & 0x0F), program & 0x7F]
            }
        }
    }
}

/// Anything that accepts channel messages: a hardware port, a software synth,
/// or a recorder in tests.
pub trait ChannelDevice: Send {
    fn send(&mut self, event: MidiEvent) -> Result<()>;

    fn name(&self) -> &str;
}

/// Output port opened through `midir`.
pub struct MidirDevice {
    connection: MidiOutputConnection,
    name: String,
}

impl MidirDevice {
    /// Names of the output ports currently visible.
    pub fn port_names(client_name: &str) -> Result<Vec<String>> {
        let output = open_client(client_name)?;
        Ok(output
            .ports()
            .iter()
            .filter_map(|port| output.port_name(port).ok())
            .collect())
    }

    /// Connect to the first port whose name contains `filter`, or to the first
    /// port at all when no filter is given.
    pub fn connect(client_name: &str, filter: Option<&str>) -> Result<Self> {
        let output = open_client(client_name)?;
        let ports = output.ports();
        let (port, name) = ports
            .iter()
            .filter_map(|port| output.port_name(port).ok().map(|name| (port, name)))
            .find(|(_, name)| filter.map_or(true, |f| name.contains(f)))
            .ok_or_else(|| match filter {
                Some(f) => PlaybackError::Device(format!("no MIDI output port matching '{f}'")),
                None => PlaybackError::Device("no MIDI output ports available".into()),
            })?;

        let connection = output
            .connect(port, &format!("{client_name}-out"))
            .map_err(|e| PlaybackError::Device(format!("cannot connect to '{name}': {e}")))?;
        info!("connected to MIDI output '{name}'");

        Ok(Self { connection, name })
    }
}

fn open_client(client_name: &str) -> Result<MidiOutput> {
    MidiOutput::new(client_name)
        .map_err(|e| PlaybackError::Device(format!("cannot open MIDI client: {e}")))
}

impl ChannelDevice for MidirDevice {
    fn send(&mut self, event: MidiEvent) -> Result<()> {
        self.connection
            .send(&event.to_bytes())
            .map_err(|e| PlaybackError::Device(format!("{}: {e}", self.name)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_bytes_carry_the_channel() {
        let on = MidiEvent::NoteOn {
            channel: 3,
            key: 60,
            velocity: 100,
        };
        assert_eq!(on.to_bytes(), vec![0x93, 60, 100]);
        assert_eq!(on.channel(), 3);

        let program = MidiEvent::ProgramChange {
            channel: 15,
            program: 40,
        };
        assert_eq!(program.to_bytes(), vec![0xCF, 40]);
    }

    #[test]
    fn pitch_bend_splits_into_seven_bit_halves() {
        let centre = MidiEvent::PitchBend {
            channel: 0,
            value: 8192,
        };
        assert_eq!(centre.to_bytes(), vec![0xE0, 0x00, 0x40]);

        let top = MidiEvent::PitchBend {
            channel: 1,
            value: 16383,
        };
        assert_eq!(top.to_bytes(), vec![0xE1, 0x7F, 0x7F]);
    }
}
