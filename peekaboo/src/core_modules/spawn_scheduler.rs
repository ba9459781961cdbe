// THEORY:
// The `SpawnScheduler` turns the raw presence signal into two discrete decisions:
// "show another popup now" and "everyone left, close everything". It is a pure state
// machine fed with (presence, timestamp) pairs, so it can be tested without a clock
// or a runtime.
//
// Spawning is debounced with a randomized interval: each presence sample draws a
// fresh threshold from the configured range and a popup is spawned only when the
// time since the previous spawn exceeds it. Continuous presence therefore yields a
// loosely rhythmic trickle of popups instead of one per sample.
//
// Closing waits for a grace period with no presence, then fires once. It is re-armed
// by the next presence sample, so a long absence produces a single CloseAll.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

/// A decision taken on one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerEvent {
    Spawn,
    CloseAll,
}

/// Bounds, in seconds, of the randomized spawn interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnInterval {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl SpawnInterval {
    pub fn new(min_secs: f64, max_secs: f64) -> Self {
        Self { min_secs, max_secs }
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.max_secs > self.min_secs {
            rng.random_range(self.min_secs..self.max_secs)
        } else {
            self.min_secs
        }
    }
}

/// Rate-limits popup creation and detects presence loss.
#[derive(Debug)]
pub struct SpawnScheduler<R> {
    interval: SpawnInterval,
    grace: Duration,
    last_spawn: Instant,
    last_presence: Instant,
    close_armed: bool,
    rng: R,
}

impl<R: Rng> SpawnScheduler<R> {
    /// Both clocks start at `now`: the first spawn needs a full interval of presence,
    /// and nothing is closed until presence has been seen at least once.
    pub fn new(interval: SpawnInterval, grace: Duration, now: Instant, rng: R) -> Self {
        Self {
            interval,
            grace,
            last_spawn: now,
            last_presence: now,
            close_armed: false,
            rng,
        }
    }

    /// Feeds one detector sample taken at `now`.
    pub fn observe(&mut self, present: bool, now: Instant) -> Option<SchedulerEvent> {
        if present {
            self.last_presence = now;
            self.close_armed = true;
            let threshold = self.interval.draw(&mut self.rng);
            let since_spawn = now.saturating_duration_since(self.last_spawn).as_secs_f64();
            if since_spawn > threshold {
                self.last_spawn = now;
                return Some(SchedulerEvent::Spawn);
            }
            None
        } else if self.close_armed
            && now.saturating_duration_since(self.last_presence) > self.grace
        {
            self.close_armed = false;
            Some(SchedulerEvent::CloseAll)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const TICK: Duration = Duration::from_millis(100);

    fn scheduler(seed: u64, start: Instant) -> SpawnScheduler<StdRng> {
        SpawnScheduler::new(
            SpawnInterval::new(2.0, 4.0),
            Duration::from_secs(1),
            start,
            StdRng::seed_from_u64(seed),
        )
    }

    #[test]
    fn first_spawn_lands_between_two_and_four_seconds() {
        for seed in 0..50 {
            let start = Instant::now();
            let mut s = scheduler(seed, start);
            let mut spawns = Vec::new();
            for tick in 0..=40u32 {
                let now = start + TICK * tick;
                if s.observe(true, now) == Some(SchedulerEvent::Spawn) {
                    spawns.push(now - start);
                }
            }
            assert_eq!(spawns.len(), 1, "seed {seed}: {spawns:?}");
            assert!(spawns[0] > Duration::from_secs(2) && spawns[0] <= Duration::from_secs(4));
        }
    }

    #[test]
    fn continuous_presence_is_rate_limited() {
        let start = Instant::now();
        let mut s = scheduler(7, start);
        let mut last: Option<Duration> = None;
        for tick in 0..600u32 {
            let now = start + TICK * tick;
            if s.observe(true, now) == Some(SchedulerEvent::Spawn) {
                let at = now - start;
                if let Some(prev) = last {
                    assert!(at - prev > Duration::from_secs(2));
                }
                last = Some(at);
            }
        }
        assert!(last.is_some());
    }

    #[test]
    fn absence_closes_once_after_the_grace_period() {
        let start = Instant::now();
        let mut s = scheduler(1, start);
        for tick in 0..10u32 {
            s.observe(true, start + TICK * tick);
        }
        let gone = start + TICK * 9;

        let mut closes = Vec::new();
        for tick in 10..60u32 {
            let now = start + TICK * tick;
            if s.observe(false, now) == Some(SchedulerEvent::CloseAll) {
                closes.push(now - gone);
            }
        }
        assert_eq!(closes.len(), 1);
        assert!(closes[0] > Duration::from_secs(1) && closes[0] <= Duration::from_millis(1100));

        // Presence re-arms the close.
        s.observe(true, start + TICK * 60);
        assert_eq!(s.observe(false, start + TICK * 80), Some(SchedulerEvent::CloseAll));
    }

    #[test]
    fn no_close_before_anyone_was_seen() {
        let start = Instant::now();
        let mut s = scheduler(2, start);
        for tick in 0..50u32 {
            assert_eq!(s.observe(false, start + TICK * tick), None);
        }
    }
}
