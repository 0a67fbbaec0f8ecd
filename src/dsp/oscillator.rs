#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/*
Oscillator
==========

A phase accumulator. Phase runs from 0.0 to 1.0 once per cycle:

    increment = frequency / sample_rate
    phase     = fract(phase + increment)

and the waveform maps phase to a sample in -1.0..=1.0:

    sine       sin(2 pi phase)
    square     +1 for the first half of the cycle, -1 for the second
    triangle   1 - 4 |phase - 0.5|       (starts at -1, peaks mid-cycle)
    sawtooth   2 phase - 1

The naive shapes alias at high frequencies. Good enough for cue tones and
sketches, which is what voice instruments are for.
*/

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Triangle,
    Sawtooth,
}

impl Waveform {
    /// Sample at `phase` (0.0..1.0).
    #[inline]
    pub fn sample(self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (std::f32::consts::TAU * phase).sin(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
            Waveform::Sawtooth => 2.0 * phase - 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Oscillator {
    waveform: Waveform,
    phase: f32,
    increment: f32,
    sample_rate: f32,
}

impl Oscillator {
    pub fn new(waveform: Waveform, sample_rate: f32) -> Self {
        Self {
            waveform,
            phase: 0.0,
            increment: 440.0 / sample_rate,
            sample_rate,
        }
    }

    pub fn set_frequency(&mut self, frequency: f32) {
        self.increment = frequency / self.sample_rate;
    }

    pub fn frequency(&self) -> f32 {
        self.increment * self.sample_rate
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        let sample = self.waveform.sample(self.phase);
        self.phase = (self.phase + self.increment).fract();
        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes_at_key_phases() {
        assert_eq!(Waveform::Square.sample(0.25), 1.0);
        assert_eq!(Waveform::Square.sample(0.75), -1.0);
        assert_eq!(Waveform::Triangle.sample(0.0), -1.0);
        assert_eq!(Waveform::Triangle.sample(0.5), 1.0);
        assert_eq!(Waveform::Sawtooth.sample(0.0), -1.0);
        assert!((Waveform::Sine.sample(0.25) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn one_cycle_per_period() {
        // 4 samples per cycle
        let mut osc = Oscillator::new(Waveform::Square, 400.0);
        osc.set_frequency(100.0);
        let cycle: Vec<f32> = (0..8).map(|_| osc.next_sample()).collect();
        assert_eq!(cycle, vec![1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0, -1.0]);
        assert_eq!(osc.frequency(), 100.0);
    }

    #[test]
    fn output_stays_in_range() {
        for waveform in [Waveform::Sine, Waveform::Square, Waveform::Triangle, Waveform::Sawtooth] {
            let mut osc = Oscillator::new(waveform, 48_000.0);
            osc.set_frequency(1234.5);
            for _ in 0..10_000 {
                let s = osc.next_sample();
                assert!((-1.0..=1.0).contains(&s), "{waveform:?} gave {s}");
            }
        }
    }
}
