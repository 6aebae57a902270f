use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A scalar that sweeps back and forth between two bounds.
///
/// The value moves by `speed * dt` per step and reverses at a bound. It is
/// clamped to the bound it crossed, so it never leaves `[min, max]`. Steps are
/// wall-clock deltas, which makes the period depend on frame pacing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Oscillator {
    min: f32,
    max: f32,
    speed: f32,
    value: f32,
    rising: bool,
}

impl Oscillator {
    /// `min` and `max` are swapped if given in the wrong order; `start` is
    /// clamped into the band.
    pub fn new(min: f32, max: f32, start: f32, speed: f32) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            speed: speed.abs(),
            value: start.max(min).min(max),
            rising: true,
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn bounds(&self) -> (f32, f32) {
        (self.min, self.max)
    }

    pub fn advance(&mut self, dt: f32) -> f32 {
        let step = self.speed * dt.max(0.0);
        if self.rising {
            self.value += step;
            if self.value >= self.max {
                self.value = self.max;
                self.rising = false;
            }
        } else {
            self.value -= step;
            if self.value <= self.min {
                self.value = self.min;
                self.rising = true;
            }
        }
        self.value
    }
}

/// Named oscillators of a scene, advanced together once per frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Animations {
    oscillators: BTreeMap<String, Oscillator>,
}

impl Animations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, oscillator: Oscillator) {
        self.oscillators.insert(name.into(), oscillator);
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.oscillators.get(name).map(Oscillator::value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.oscillators.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.oscillators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.oscillators.is_empty()
    }

    pub fn advance(&mut self, dt: f32) {
        for oscillator in self.oscillators.values_mut() {
            oscillator.advance(dt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_within_band_for_any_step() {
        for step in [0.01, 0.05, 0.9, 3.7, 7.99] {
            let mut sea = Oscillator::new(100.0, 108.0, 100.0, step);
            for _ in 0..10_000 {
                let value = sea.advance(1.0);
                assert!((100.0..=108.0).contains(&value), "{value} escaped with step {step}");
            }
        }
    }

    #[test]
    fn reverses_at_the_bounds() {
        let mut osc = Oscillator::new(0.0, 1.0, 0.0, 0.4);
        let values: Vec<f32> = (0..6).map(|_| osc.advance(1.0)).collect();
        let expected = [0.4, 0.8, 1.0, 0.6, 0.2, 0.0];
        for (value, expected) in values.iter().zip(expected) {
            assert!((value - expected).abs() < 1e-6, "{values:?}");
        }
        assert!((osc.advance(1.0) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn start_outside_band_is_clamped() {
        let osc = Oscillator::new(8.0, 2.0, 50.0, 1.0);
        assert_eq!(osc.bounds(), (2.0, 8.0));
        assert_eq!(osc.value(), 8.0);
    }

    #[test]
    fn nan_bound_does_not_panic() {
        let osc = Oscillator::new(f32::NAN, 1.0, 0.5, 1.0);
        assert!(osc.value().is_finite());
    }

    #[test]
    fn animations_advance_together() {
        let mut animations = Animations::new();
        animations.insert("sea_level", Oscillator::new(100.0, 108.0, 100.0, 3.0));
        animations.insert("fire", Oscillator::new(0.6, 1.0, 1.0, 2.0));
        animations.advance(0.1);
        assert!((animations.get("sea_level").unwrap() - 100.3).abs() < 1e-4);
        assert_eq!(animations.get("fire"), Some(1.0));
        animations.advance(0.1);
        assert!((animations.get("fire").unwrap() - 0.8).abs() < 1e-5);
        assert_eq!(animations.get("missing"), None);
    }
}
