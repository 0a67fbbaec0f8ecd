use std::collections::HashMap;

use log::warn;

use crate::sequencing::pitch::pitch_to_frequency;

/// Identity of a sounding pitch, keyed by the exact frequency bits so that
/// microtonal notes get their own voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PitchKey(u64);

impl PitchKey {
    pub fn frequency(&self) -> f64 {
        f64::from_bits(self.0)
    }
}

impl From<f64> for PitchKey {
    fn from(frequency: f64) -> Self {
        // fold -0.0 into 0.0
        PitchKey((frequency + 0.0).to_bits())
    }
}

impl From<u8> for PitchKey {
    fn from(pitch: u8) -> Self {
        PitchKey::from(pitch_to_frequency(pitch))
    }
}

/// Maps sounding pitches onto a fixed pool of voices.
///
/// A pitch that is already sounding gets its own voice back, so a retrigger
/// never takes a second voice. New pitches take the lowest free voice.
#[derive(Debug, Clone)]
pub struct VoiceAllocator {
    slots: Vec<Option<PitchKey>>,
    voices: HashMap<PitchKey, usize>,
}

impl VoiceAllocator {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            voices: HashMap::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Voice for `key`, or `None` when every voice is taken.
    pub fn allocate(&mut self, key: impl Into<PitchKey>) -> Option<usize> {
        let key = key.into();
        if let Some(&voice) = self.voices.get(&key) {
            return Some(voice);
        }
        let voice = self.slots.iter().position(Option::is_none)?;
        self.slots[voice] = Some(key);
        self.voices.insert(key, voice);
        Some(voice)
    }

    /// Release the voice bound to `key`. Releasing an unbound pitch only warns.
    pub fn deallocate(&mut self, key: impl Into<PitchKey>) -> Option<usize> {
        let key = key.into();
        match self.voices.remove(&key) {
            Some(voice) => {
                self.slots[voice] = None;
                Some(voice)
            }
            None => {
                warn!("{:.2} Hz has no voice allocated", key.frequency());
                None
            }
        }
    }

    pub fn voice_for(&self, key: impl Into<PitchKey>) -> Option<usize> {
        self.voices.get(&key.into()).copied()
    }

    pub fn active(&self) -> usize {
        self.voices.len()
    }

    pub fn free(&self) -> usize {
        self.capacity() - self.active()
    }

    pub fn reset(&mut self) {
        self.slots.fill(None);
        self.voices.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_pitch_keeps_its_voice() {
        let mut alloc = VoiceAllocator::new(4);
        assert_eq!(alloc.allocate(60u8), Some(0));
        assert_eq!(alloc.allocate(60u8), Some(0));
        assert_eq!(alloc.active(), 1);
    }

    #[test]
    fn exhaustion_returns_none() {
        let mut alloc = VoiceAllocator::new(3);
        for (voice, pitch) in [60u8, 62, 64].into_iter().enumerate() {
            assert_eq!(alloc.allocate(pitch), Some(voice));
        }
        assert_eq!(alloc.allocate(65u8), None);
        assert_eq!(alloc.free(), 0);
    }

    #[test]
    fn freed_voices_are_reused_lowest_first() {
        let mut alloc = VoiceAllocator::new(4);
        for pitch in [60u8, 62, 64, 65] {
            alloc.allocate(pitch);
        }
        assert_eq!(alloc.deallocate(64u8), Some(2));
        assert_eq!(alloc.deallocate(62u8), Some(1));

        assert_eq!(alloc.allocate(70u8), Some(1));
        assert_eq!(alloc.allocate(71u8), Some(2));
    }

    #[test]
    fn deallocating_unbound_pitch_is_harmless() {
        let mut alloc = VoiceAllocator::new(2);
        alloc.allocate(60u8);
        assert_eq!(alloc.deallocate(61u8), None);
        assert_eq!(alloc.deallocate(60u8), Some(0));
        assert_eq!(alloc.deallocate(60u8), None);
        assert_eq!(alloc.active(), 0);
    }

    #[test]
    fn microtones_are_distinct_pitches() {
        let mut alloc = VoiceAllocator::new(2);
        assert_eq!(alloc.allocate(440.0), Some(0));
        assert_eq!(alloc.allocate(452.89), Some(1));
        assert_eq!(alloc.voice_for(69u8), Some(0));
    }

    #[test]
    fn reset_frees_everything() {
        let mut alloc = VoiceAllocator::new(2);
        alloc.allocate(60u8);
        alloc.allocate(61u8);
        alloc.reset();
        assert_eq!(alloc.free(), 2);
        assert_eq!(alloc.allocate(62u8), Some(0));
    }
}
