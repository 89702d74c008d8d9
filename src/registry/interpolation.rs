//! # Interpolation History
//!
//! Timestamped origin samples used by the presentation layer to render an
//! object between network updates.

use std::collections::VecDeque;

use glam::Vec3;

/// Bounded, time-ordered sample buffer
#[derive(Debug, Clone)]
pub struct InterpolationHistory {
    samples: VecDeque<(f64, Vec3)>,
    capacity: usize,
}

impl InterpolationHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(2),
        }
    }

    /// Append a sample. Samples at or after `time` are replaced.
    pub fn push(&mut self, time: f64, value: Vec3) {
        while self.samples.back().is_some_and(|&(t, _)| t >= time) {
            self.samples.pop_back();
        }
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((time, value));
    }

    /// Forget every sample and restart the history from a single value
    pub fn reset(&mut self, time: f64, value: Vec3) {
        self.samples.clear();
        self.samples.push_back((time, value));
    }

    /// Linearly interpolated value at `time`, clamped to the held range
    pub fn sample(&self, time: f64) -> Option<Vec3> {
        let (first_time, first) = *self.samples.front()?;
        if time <= first_time {
            return Some(first);
        }

        for (&(t0, v0), &(t1, v1)) in self.samples.iter().zip(self.samples.iter().skip(1)) {
            if time <= t1 {
                let span = t1 - t0;
                if span <= f64::EPSILON {
                    return Some(v1);
                }
                let t = ((time - t0) / span) as f32;
                return Some(v0.lerp(v1, t));
            }
        }

        self.samples.back().map(|&(_, v)| v)
    }

    pub fn latest(&self) -> Option<(f64, Vec3)> {
        self.samples.back().copied()
    }

    pub fn oldest_time(&self) -> Option<f64> {
        self.samples.front().map(|&(t, _)| t)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_lerps() {
        let mut history = InterpolationHistory::new(8);
        history.push(0.0, Vec3::ZERO);
        history.push(1.0, Vec3::new(10.0, 0.0, 0.0));

        let mid = history.sample(0.5).unwrap();
        assert!((mid.x - 5.0).abs() < 1e-5);
        assert_eq!(history.sample(-1.0), Some(Vec3::ZERO));
        assert_eq!(history.sample(2.0), Some(Vec3::new(10.0, 0.0, 0.0)));
    }

    #[test]
    fn test_push_replaces_newer_samples() {
        let mut history = InterpolationHistory::new(8);
        history.push(0.0, Vec3::ZERO);
        history.push(2.0, Vec3::ONE);
        history.push(1.0, Vec3::X);

        assert_eq!(history.len(), 2);
        assert_eq!(history.latest(), Some((1.0, Vec3::X)));
    }

    #[test]
    fn test_reset() {
        let mut history = InterpolationHistory::new(4);
        for i in 0..10 {
            history.push(i as f64, Vec3::splat(i as f32));
        }
        assert_eq!(history.len(), 4);

        history.reset(3.5, Vec3::Y);
        assert_eq!(history.len(), 1);
        assert_eq!(history.oldest_time(), Some(3.5));
        assert_eq!(history.sample(100.0), Some(Vec3::Y));
    }
}
