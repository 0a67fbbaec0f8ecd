/*
Linear Ramp
===========

Smooths a control value (voice gain) toward a target over a given time, so a
volume change becomes a short glide instead of a step. Steps click; glides
don't.

Same math as a linear envelope stage:

    samples   = ramp_seconds * sample_rate
    increment = (target - current) / samples

After `samples` steps the value lands exactly on the target. A ramp time of
zero jumps straight there.
*/

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearRamp {
    current: f32,
    target: f32,
    increment: f32,
    remaining: u32,
}

impl LinearRamp {
    pub fn new(value: f32) -> Self {
        Self {
            current: value,
            target: value,
            increment: 0.0,
            remaining: 0,
        }
    }

    pub fn ramp_to(&mut self, target: f32, seconds: f32, sample_rate: f32) {
        let samples = (seconds.max(0.0) * sample_rate) as u32;
        self.target = target;
        if samples == 0 {
            self.current = target;
            self.remaining = 0;
        } else {
            self.increment = (target - self.current) / samples as f32;
            self.remaining = samples;
        }
    }

    #[inline]
    pub fn next_value(&mut self) -> f32 {
        if self.remaining > 0 {
            self.remaining -= 1;
            self.current = if self.remaining == 0 {
                self.target
            } else {
                self.current + self.increment
            };
        }
        self.current
    }

    pub fn value(&self) -> f32 {
        self.current
    }

    #[cfg(test)]
    fn is_ramping(&self) -> bool {
        self.remaining > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaches_target_after_ramp_time() {
        let mut ramp = LinearRamp::new(0.0);
        ramp.ramp_to(1.0, 0.01, 1000.0); // 10 samples

        let values: Vec<f32> = (0..10).map(|_| ramp.next_value()).collect();
        assert!((values[4] - 0.5).abs() < 1e-6);
        assert_eq!(values[9], 1.0);
        assert!(!ramp.is_ramping());
        assert_eq!(ramp.next_value(), 1.0);
    }

    #[test]
    fn zero_time_jumps() {
        let mut ramp = LinearRamp::new(0.3);
        ramp.ramp_to(0.8, 0.0, 48_000.0);
        assert_eq!(ramp.value(), 0.8);
        assert_eq!(ramp.next_value(), 0.8);
    }

    #[test]
    fn retarget_mid_ramp_starts_from_current_value() {
        let mut ramp = LinearRamp::new(0.0);
        ramp.ramp_to(1.0, 0.004, 1000.0); // 4 samples
        ramp.next_value();
        ramp.next_value();
        ramp.ramp_to(0.0, 0.002, 1000.0);
        assert!((ramp.next_value() - 0.25).abs() < 1e-6);
        assert_eq!(ramp.next_value(), 0.0);
    }
}
