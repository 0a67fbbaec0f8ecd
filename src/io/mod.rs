// Purpose - device backends: MIDI out, audio out, and in-memory recorders

#[cfg(feature = "rtrb")]
pub mod audio;
pub mod midi;
pub mod recording;
