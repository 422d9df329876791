use std::time::Instant;

/// Source of per-frame elapsed time.
pub trait FrameClock {
    /// Seconds since the previous sample.
    fn delta(&mut self) -> f64;
}

/// Wall clock that starts on its first sample, which always reads zero.
#[derive(Debug, Default)]
pub struct Clock {
    last: Option<Instant>,
}

impl Clock {
    pub fn new() -> Self {
        Self { last: None }
    }

    pub fn is_running(&self) -> bool {
        self.last.is_some()
    }
}

impl FrameClock for Clock {
    fn delta(&mut self) -> f64 {
        let now = Instant::now();
        let delta = match self.last {
            Some(last) => now.duration_since(last).as_secs_f64(),
            None => 0.0,
        };
        self.last = Some(now);
        delta
    }
}

/// Clock that replays a scripted sequence of deltas, then reports zero.
#[derive(Debug, Default)]
pub struct ManualClock {
    deltas: std::collections::VecDeque<f64>,
}

impl ManualClock {
    pub fn new(deltas: impl IntoIterator<Item = f64>) -> Self {
        Self {
            deltas: deltas.into_iter().collect(),
        }
    }

    pub fn push(&mut self, delta: f64) {
        self.deltas.push_back(delta);
    }
}

impl FrameClock for ManualClock {
    fn delta(&mut self) -> f64 {
        self.deltas.pop_front().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_is_zero() {
        let mut clock = Clock::new();
        assert!(!clock.is_running());
        assert_eq!(clock.delta(), 0.0);
        assert!(clock.is_running());
    }

    #[test]
    fn test_samples_are_non_negative() {
        let mut clock = Clock::new();
        clock.delta();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let delta = clock.delta();
        assert!(delta > 0.0, "expected elapsed time, got {}", delta);
        assert!(clock.delta() >= 0.0);
    }

    #[test]
    fn test_manual_clock_replays_then_idles() {
        let mut clock = ManualClock::new([0.5, 0.25]);
        clock.push(1.0);
        assert_eq!(clock.delta(), 0.5);
        assert_eq!(clock.delta(), 0.25);
        assert_eq!(clock.delta(), 1.0);
        assert_eq!(clock.delta(), 0.0);
    }
}
