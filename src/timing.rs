//! Wall-clock accounting per pipeline stage
use std::time::{Duration, Instant};

/// Time spent by one worker, split into compute and communication
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Timings {
    /// From the opening to the closing barrier
    pub total: Duration,
    /// Local work: bucketizing, sorting, merging
    pub compute: Duration,
    /// Time inside fabric calls
    pub communication: Duration,
}

impl Timings {
    /// Run `f`, charging its duration to compute
    pub fn compute<R>(&mut self, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let result = f();
        self.compute += start.elapsed();
        result
    }

    /// Run `f`, charging its duration to communication
    pub fn communication<R>(&mut self, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let result = f();
        self.communication += start.elapsed();
        result
    }

    /// Fraction of the total spent computing
    pub fn compute_share(&self) -> f64 {
        share(self.compute, self.total)
    }

    /// Fraction of the total spent communicating
    pub fn communication_share(&self) -> f64 {
        share(self.communication, self.total)
    }
}

fn share(part: Duration, total: Duration) -> f64 {
    if total.is_zero() {
        0.0
    } else {
        part.as_secs_f64() / total.as_secs_f64()
    }
}

#[cfg(test)]
mod test {
    use super::Timings;
    use std::time::Duration;

    #[test]
    fn test_accumulates() {
        let mut timings = Timings::default();
        let x = timings.compute(|| {
            std::thread::sleep(Duration::from_millis(2));
            7
        });
        assert_eq!(x, 7);
        timings.communication(|| ());
        assert!(timings.compute >= Duration::from_millis(2));
        assert_eq!(timings.compute_share(), 0.0);

        timings.total = timings.compute * 2;
        assert!((timings.compute_share() - 0.5).abs() < 1e-9);
    }
}
