pub mod envelope;
pub mod flatten;
pub mod material;
pub mod notes;
pub mod pitch;
pub mod time_signature;

pub use envelope::{Envelope, EnvelopePlan, VolumeRamp};
pub use flatten::{flatten, group_chords, schedule_list, FlatEvent};
pub use material::{Material, Note, Part, Phrase, Score};
pub use time_signature::TimeSignature;
