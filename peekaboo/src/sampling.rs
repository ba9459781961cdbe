// THEORY:
// The sampling loop is the engine's only input. At a fixed period it polls a
// presence `Detector`, publishes the detected target point, feeds the sample to the
// `SpawnScheduler` and acts on whatever the scheduler decides.
//
// Key architectural principles:
// 1.  **Blocking detectors stay off the async workers**: `poll` may grab a camera
//     frame and run a cascade classifier, so it runs on the blocking pool. The
//     detector is moved into the blocking task and handed back with the sample.
// 2.  **Spawn never stalls sampling**: a `Spawn` decision starts a separate task for
//     `spawn_popup` (which decodes media) and the loop moves straight on. A failed
//     spawn is logged and forgotten. A spawn overtaken by a close-all is refused by
//     the engine, so it cannot outlive the absence that closed everything.
// 3.  **Detector failure is fatal to the loop only**: `run` returns the error. Popups
//     already on screen are left alone; the caller decides when to shut down.

use std::collections::VecDeque;
use std::time::Duration;

use log::{debug, error, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, MissedTickBehavior};

use crate::core_modules::geometry::Point;
use crate::core_modules::spawn_scheduler::{SchedulerEvent, SpawnScheduler};
use crate::core_modules::target::TargetWriter;
use crate::engine::PopupEngine;
use crate::error::{DetectorError, EngineError};

/// One reading of the presence signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresenceSample {
    pub present: bool,
    /// Screen-space point popups should drift toward. Ignored when nobody is present.
    pub target: Point,
}

impl PresenceSample {
    pub fn present_at(target: Point) -> Self {
        Self {
            present: true,
            target,
        }
    }

    pub fn absent() -> Self {
        Self {
            present: false,
            target: Point::default(),
        }
    }
}

/// Source of presence samples, polled once per sampling period.
pub trait Detector: Send + 'static {
    fn poll(&mut self) -> Result<PresenceSample, DetectorError>;
}

/// A stretch of a scripted scenario.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScriptSegment {
    pub present: bool,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    /// How long the segment lasts.
    pub secs: f64,
}

/// Replays a fixed list of segments, one sample per period, then reports the
/// stream as ended.
#[derive(Debug, Clone)]
pub struct ScriptedDetector {
    samples: VecDeque<PresenceSample>,
}

impl ScriptedDetector {
    pub fn new(segments: &[ScriptSegment], period: Duration) -> Self {
        let period = period.as_secs_f64().max(f64::EPSILON);
        let mut samples = VecDeque::new();
        for segment in segments {
            let count = (segment.secs.max(0.0) / period).round() as usize;
            let sample = PresenceSample {
                present: segment.present,
                target: Point::new(segment.x, segment.y),
            };
            samples.extend(std::iter::repeat_n(sample, count));
        }
        Self { samples }
    }

    pub fn remaining(&self) -> usize {
        self.samples.len()
    }
}

impl Detector for ScriptedDetector {
    fn poll(&mut self) -> Result<PresenceSample, DetectorError> {
        self.samples.pop_front().ok_or(DetectorError::StreamEnded)
    }
}

/// Drives a `PopupEngine` from a detector.
pub struct SamplingLoop {
    engine: PopupEngine,
    target: TargetWriter,
    period: Duration,
    scheduler: SpawnScheduler<StdRng>,
}

impl SamplingLoop {
    pub fn new(engine: PopupEngine, target: TargetWriter) -> Self {
        let config = engine.config();
        let rng = match config.seed {
            // Decorrelated from the engine's own stream.
            Some(seed) => StdRng::seed_from_u64(seed ^ 0x5eed),
            None => StdRng::from_os_rng(),
        };
        let scheduler = SpawnScheduler::new(
            config.spawn_interval(),
            config.presence_grace(),
            Instant::now(),
            rng,
        );
        Self {
            period: config.sample_period(),
            engine,
            target,
            scheduler,
        }
    }

    /// Runs until the engine shuts down (`Ok`) or the detector fails (`Err`).
    pub async fn run<D: Detector>(mut self, mut detector: D) -> Result<(), DetectorError> {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("sampling presence every {:?}", self.period);

        loop {
            ticker.tick().await;
            if self.engine.is_shutting_down() {
                info!("engine shut down, sampling stopped");
                return Ok(());
            }

            // --- 1. Poll the detector on the blocking pool ---
            let (returned, sample) = tokio::task::spawn_blocking(move || {
                let sample = detector.poll();
                (detector, sample)
            })
            .await?;
            detector = returned;
            let sample = match sample {
                Ok(sample) => sample,
                Err(e) => {
                    error!("presence detector failed: {e}");
                    return Err(e);
                }
            };

            // --- 2. Publish the target ---
            if sample.present {
                self.target.publish(sample.target);
            }

            // --- 3. Act on the scheduler's decision ---
            match self.scheduler.observe(sample.present, Instant::now()) {
                Some(SchedulerEvent::Spawn) => {
                    let engine = self.engine.clone();
                    tokio::spawn(async move {
                        match engine.spawn_popup().await {
                            Ok(_) => {}
                            Err(EngineError::Closed) => {
                                debug!("late popup dropped, nobody present")
                            }
                            Err(e) => warn!("popup creation failed: {e}"),
                        }
                    });
                }
                Some(SchedulerEvent::CloseAll) => {
                    debug!("presence lost");
                    self.engine.close_all();
                }
                None => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_expands_to_one_sample_per_period() {
        let segments = [
            ScriptSegment {
                present: true,
                x: 10.0,
                y: 20.0,
                secs: 1.0,
            },
            ScriptSegment {
                present: false,
                x: 0.0,
                y: 0.0,
                secs: 0.5,
            },
        ];
        let mut detector = ScriptedDetector::new(&segments, Duration::from_millis(100));
        assert_eq!(detector.remaining(), 15);

        let first = detector.poll().unwrap();
        assert_eq!(first, PresenceSample::present_at(Point::new(10.0, 20.0)));
        for _ in 0..9 {
            assert!(detector.poll().unwrap().present);
        }
        for _ in 0..5 {
            assert!(!detector.poll().unwrap().present);
        }
        assert!(matches!(detector.poll(), Err(DetectorError::StreamEnded)));
    }

    #[test]
    fn segments_parse_from_json() {
        let json = r#"[
            {"present": true, "x": 5, "y": 6, "secs": 2},
            {"present": false, "secs": 1}
        ]"#;
        let segments: Vec<ScriptSegment> = serde_json::from_str(json).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].x, 0.0);
        assert_eq!(segments[0].secs, 2.0);
    }
}
