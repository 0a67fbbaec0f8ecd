use std::time::Duration;

use log::warn;

use crate::error::{PlaybackError, Result};
use crate::sequencing::pitch::{check_time, map_range};

/*
Envelope Compilation
====================

An Envelope describes the loudness contour of one voice-backend note. It is
not rendered sample by sample here: it is compiled into a handful of volume
ramps that the scheduler fires on the timer pool, and the synth smooths each
one over its ramp time so steps never click.

Vocabulary
----------

  attack      Any number of (time, level) points. Times are relative: each one
              is measured from the previous point.

  delay       Time from the last attack point to the sustain level.

  sustain     Level held until the release starts.

  release     Time to fall from sustain to silence. The release is anchored to
              the END of the note, not to the sustain point.

  level       0.0 to 1.0 here; scaled to 0..=velocity when compiled.


The Shape
---------

  Level
    v   ┐      ╱╲
        │     ╱  ╲
    s*v │    ╱    ╲_________
        │   ╱               ╲
    0   └──╱─────────────────╲──→ Time
        0  a1   a1+d        dur-r  dur

Relative times become absolute offsets by running sum:

    attack offsets   a1, a1+a2, ...
    sustain offset   sum(attack) + delay
    release offset   note duration - release

Each ramp's smoothing time is the relative delta that leads into it, converted
to seconds.

The envelope must fit inside the note:

    length = sum(attack) + delay + release   <=   note duration

A note that is too short plays unshaped at its full velocity and a warning is
logged.
*/

/// One scheduled volume change for a sounding voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeRamp {
    /// Offset from the note start in milliseconds.
    pub offset_ms: f64,
    /// Target level, 0..=velocity.
    pub level: u8,
    /// Time to glide from the current level to `level`.
    pub ramp: Duration,
}

impl VolumeRamp {
    pub fn offset(&self) -> Duration {
        Duration::from_secs_f64(self.offset_ms / 1000.0)
    }
}

/// Result of fitting an envelope to a note.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopePlan {
    /// Start silent and follow these ramps, in time order.
    Shaped(Vec<VolumeRamp>),
    /// Envelope is longer than the note: play at flat velocity.
    Unshaped,
}

impl EnvelopePlan {
    /// Volume the voice starts at before any ramp fires.
    pub fn initial_volume(&self, velocity: u8) -> u8 {
        match self {
            EnvelopePlan::Shaped(_) => 0,
            EnvelopePlan::Unshaped => velocity,
        }
    }

    pub fn ramps(&self) -> &[VolumeRamp] {
        match self {
            EnvelopePlan::Shaped(ramps) => ramps,
            EnvelopePlan::Unshaped => &[],
        }
    }
}

/// Attack/delay/sustain/release description. Times in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    attack_times: Vec<f64>,
    attack_values: Vec<f64>,
    delay_time: f64,
    sustain_value: f64,
    release_time: f64,
}

impl Default for Envelope {
    /// A short click-free envelope: 2 ms to full, 1 ms to sustain, 2 ms release.
    fn default() -> Self {
        Self {
            attack_times: vec![2.0],
            attack_values: vec![1.0],
            delay_time: 1.0,
            sustain_value: 1.0,
            release_time: 2.0,
        }
    }
}

fn check_level(value: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(PlaybackError::LevelOutOfRange(value))
    }
}

fn check_attack(times: &[f64], values: &[f64]) -> Result<()> {
    if times.len() != values.len() {
        return Err(PlaybackError::MismatchedLengths {
            what: "envelope attack values",
            expected: times.len(),
            actual: values.len(),
        });
    }
    for &time in times {
        check_time(time)?;
    }
    for &value in values {
        check_level(value)?;
    }
    Ok(())
}

impl Envelope {
    pub fn new(
        attack_times: Vec<f64>,
        attack_values: Vec<f64>,
        delay_time: f64,
        sustain_value: f64,
        release_time: f64,
    ) -> Result<Self> {
        check_attack(&attack_times, &attack_values)?;
        Ok(Self {
            attack_times,
            attack_values,
            delay_time: check_time(delay_time)?,
            sustain_value: check_level(sustain_value)?,
            release_time: check_time(release_time)?,
        })
    }

    /// Replace both attack lists together; they must stay the same length.
    pub fn set_attack(&mut self, times: Vec<f64>, values: Vec<f64>) -> Result<()> {
        check_attack(&times, &values)?;
        self.attack_times = times;
        self.attack_values = values;
        Ok(())
    }

    pub fn set_attack_times(&mut self, times: Vec<f64>) -> Result<()> {
        check_attack(&times, &self.attack_values)?;
        self.attack_times = times;
        Ok(())
    }

    pub fn set_attack_values(&mut self, values: Vec<f64>) -> Result<()> {
        check_attack(&self.attack_times, &values)?;
        self.attack_values = values;
        Ok(())
    }

    pub fn set_delay(&mut self, delay_time: f64) -> Result<()> {
        self.delay_time = check_time(delay_time)?;
        Ok(())
    }

    pub fn set_sustain(&mut self, sustain_value: f64) -> Result<()> {
        self.sustain_value = check_level(sustain_value)?;
        Ok(())
    }

    pub fn set_release(&mut self, release_time: f64) -> Result<()> {
        self.release_time = check_time(release_time)?;
        Ok(())
    }

    pub fn attack_times(&self) -> &[f64] {
        &self.attack_times
    }

    pub fn attack_values(&self) -> &[f64] {
        &self.attack_values
    }

    pub fn delay_time(&self) -> f64 {
        self.delay_time
    }

    pub fn sustain_value(&self) -> f64 {
        self.sustain_value
    }

    pub fn release_time(&self) -> f64 {
        self.release_time
    }

    /// Attack times as offsets from the note start.
    pub fn absolute_attack_times(&self) -> Vec<f64> {
        self.attack_times
            .iter()
            .scan(0.0, |elapsed, time| {
                *elapsed += time;
                Some(*elapsed)
            })
            .collect()
    }

    /// Offset from the note start at which the sustain level is reached.
    pub fn absolute_delay_time(&self) -> f64 {
        self.attack_times.iter().sum::<f64>() + self.delay_time
    }

    /// Shortest note this envelope fits into, in milliseconds.
    pub fn length(&self) -> f64 {
        self.absolute_delay_time() + self.release_time
    }

    /// Fit the envelope to a note of `duration_ms` played at `velocity`.
    pub fn compile(&self, velocity: u8, duration_ms: f64) -> EnvelopePlan {
        let length = self.length();
        if length > duration_ms {
            warn!(
                "envelope ({length} ms) is longer than the note ({duration_ms} ms), playing without it"
            );
            return EnvelopePlan::Unshaped;
        }

        let scale =
            |value: f64| map_range(value, (0.0, 1.0), (0.0, velocity as f64)) as u8;
        let ramp = |ms: f64| Duration::from_secs_f64(ms / 1000.0);

        let mut ramps: Vec<VolumeRamp> = self
            .absolute_attack_times()
            .into_iter()
            .zip(&self.attack_times)
            .zip(&self.attack_values)
            .map(|((offset_ms, &relative), &value)| VolumeRamp {
                offset_ms,
                level: scale(value),
                ramp: ramp(relative),
            })
            .collect();

        ramps.push(VolumeRamp {
            offset_ms: self.absolute_delay_time(),
            level: scale(self.sustain_value),
            ramp: ramp(self.delay_time),
        });
        ramps.push(VolumeRamp {
            offset_ms: duration_ms - self.release_time,
            level: 0,
            ramp: ramp(self.release_time),
        });

        EnvelopePlan::Shaped(ramps)
    }
}
