//! Per-stage timing hooks for the timestep drivers.

use std::time::{Duration, Instant};

/// Receives the wall time of each completed timestep stage.
pub trait StageObserver {
    fn stage(&mut self, name: &str, elapsed: Duration);
}

/// Forwards stage timings to `log::debug!`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl StageObserver for LogObserver {
    fn stage(&mut self, name: &str, elapsed: Duration) {
        log::debug!("  {}: {:.3?}", name, elapsed);
    }
}

/// Keeps every reported stage, in order.
#[derive(Clone, Debug, Default)]
pub struct StageTimings {
    pub stages: Vec<(String, Duration)>,
}

impl StageTimings {
    pub fn total(&self) -> Duration {
        self.stages.iter().map(|(_, d)| *d).sum()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|(name, _)| name.as_str())
    }
}

impl StageObserver for StageTimings {
    fn stage(&mut self, name: &str, elapsed: Duration) {
        self.stages.push((name.to_owned(), elapsed));
    }
}

/// Stopwatch that reports and restarts on every lap.
pub(crate) struct StageClock {
    start: Instant,
}

impl StageClock {
    pub(crate) fn start() -> Self {
        Self { start: Instant::now() }
    }

    pub(crate) fn lap(&mut self, observer: &mut dyn StageObserver, name: &str) {
        let now = Instant::now();
        observer.stage(name, now - self.start);
        self.start = now;
    }
}
