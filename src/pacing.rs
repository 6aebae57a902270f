use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_FPS: f32 = 60.0;

/// Measures frame deltas and sleeps away whatever is left of the target
/// frame duration.
#[derive(Debug, Clone)]
pub struct FramePacer {
    target: Option<Duration>,
    last_tick: Instant,
}

impl FramePacer {
    /// `fps <= 0` disables sleeping.
    pub fn new(fps: f32) -> Self {
        let target = (fps.is_finite() && fps > 0.0).then(|| Duration::from_secs_f32(1.0 / fps));
        Self {
            target,
            last_tick: Instant::now(),
        }
    }

    pub fn target(&self) -> Option<Duration> {
        self.target
    }

    /// Restarts the delta clock, e.g. after a slow startup.
    pub fn reset(&mut self) {
        self.last_tick = Instant::now();
    }

    /// Starts an iteration and returns the seconds since the previous one,
    /// including any time spent in [`FramePacer::wait`].
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let dt = now.duration_since(self.last_tick);
        self.last_tick = now;
        dt.as_secs_f32()
    }

    /// Sleeps until the target duration has passed since the last tick.
    pub fn wait(&self) -> Duration {
        let Some(target) = self.target else {
            return Duration::ZERO;
        };
        match remaining(self.last_tick.elapsed(), target) {
            Some(rest) => {
                thread::sleep(rest);
                rest
            }
            None => Duration::ZERO,
        }
    }
}

impl Default for FramePacer {
    fn default() -> Self {
        Self::new(DEFAULT_FPS)
    }
}

/// Time left in a frame of length `target` after `elapsed`, if any.
pub fn remaining(elapsed: Duration, target: Duration) -> Option<Duration> {
    target
        .checked_sub(elapsed)
        .filter(|rest| !rest.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_is_the_unused_part_of_the_frame() {
        let target = Duration::from_millis(16);
        assert_eq!(
            remaining(Duration::from_millis(6), target),
            Some(Duration::from_millis(10))
        );
        assert_eq!(remaining(Duration::from_millis(16), target), None);
        assert_eq!(remaining(Duration::from_millis(40), target), None);
    }

    #[test]
    fn non_positive_fps_disables_pacing() {
        assert_eq!(FramePacer::new(0.0).target(), None);
        assert_eq!(FramePacer::new(-5.0).target(), None);
        assert_eq!(FramePacer::new(f32::NAN).target(), None);
        assert_eq!(FramePacer::new(0.0).wait(), Duration::ZERO);
    }

    #[test]
    fn default_targets_sixty_fps() {
        let target = FramePacer::default().target().unwrap();
        assert!((target.as_secs_f64() - 1.0 / 60.0).abs() < 1e-6);
    }

    #[test]
    fn delta_includes_the_wait() {
        let mut pacer = FramePacer::new(100.0);
        pacer.tick();
        pacer.wait();
        let dt = pacer.tick();
        assert!(dt >= 0.009, "dt was {dt}");
    }
}
