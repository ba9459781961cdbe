// THEORY:
// The `motion` module is the heart of the engine's animation. Every active popup gets
// its own controller task that wakes on a fixed tick and nudges the popup toward the
// shared target point.
//
// Key architectural principles:
// 1.  **Lagging pursuit**: each tick moves the popup by a fixed fraction (`gain`) of
//     the remaining distance between its centre and the target. This is a first-order
//     low-pass filter; detector noise is smoothed away and popups crawl rather than
//     snap.
// 2.  **Greedy de-overlap**: after the pursuit step the candidate rectangle is tested
//     against every sibling in registry order. For each overlap the candidate is
//     pushed out along the axis with the smaller overlap (horizontal on a tie), away
//     from the sibling's centre, by exactly that overlap. Pushes are applied one
//     neighbour at a time, so dense clusters settle over several ticks rather than in
//     one solve.
// 3.  **Always on screen**: the result is clamped to the screen every tick before it
//     is committed.
// 4.  **Cooperative exit**: the controller checks for shutdown and for a destroyed
//     popup at the top of every tick and returns promptly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::debug;

use crate::core_modules::geometry::{Point, Rect, Size};
use crate::core_modules::popup::Popup;
use crate::core_modules::registry::PopupRegistry;
use crate::core_modules::target::TargetReader;

/// Per-popup steering parameters.
#[derive(Debug, Clone, Copy)]
pub struct MotionController {
    pub gain: f64,
    pub screen: Size,
    pub tick: Duration,
}

impl MotionController {
    pub fn new(gain: f64, screen: Size, tick: Duration) -> Self {
        Self { gain, screen, tick }
    }

    /// Computes the popup's next rectangle.
    pub fn step(&self, current: Rect, target: Point, neighbors: &[Rect]) -> Rect {
        // --- 1. Pursuit ---
        let center = current.center();
        let candidate = current.translated(
            (target.x - center.x) * self.gain,
            (target.y - center.y) * self.gain,
        );

        // --- 2. De-overlap, neighbour by neighbour ---
        let separated = neighbors
            .iter()
            .fold(candidate, |rect, neighbor| push_apart(rect, neighbor));

        // --- 3. Clamp ---
        separated.clamped_within(self.screen)
    }

    /// Drives `popup` until it is destroyed or `stop` is raised.
    pub async fn drive(
        self,
        popup: Arc<Popup>,
        registry: Arc<PopupRegistry>,
        target: TargetReader,
        stop: Arc<AtomicBool>,
    ) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if stop.load(Ordering::Acquire) || popup.is_destroyed() {
                break;
            }
            let neighbors = registry.obstacles_except(popup.id());
            let next = self.step(popup.rect(), target.latest(), &neighbors);
            popup.set_rect(next);
        }
        debug!("{} motion stopped", popup.id());
    }
}

/// Moves `rect` out of `neighbor` along the axis of least overlap.
fn push_apart(rect: Rect, neighbor: &Rect) -> Rect {
    let Some((horizontal, vertical)) = rect.overlap_extents(neighbor) else {
        return rect;
    };
    let ours = rect.center();
    let theirs = neighbor.center();
    if horizontal <= vertical {
        let dx = if ours.x < theirs.x { -horizontal } else { horizontal };
        rect.translated(dx, 0.0)
    } else {
        let dy = if ours.y < theirs.y { -vertical } else { vertical };
        rect.translated(0.0, dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> MotionController {
        MotionController::new(0.05, Size::new(1000.0, 800.0), Duration::from_millis(50))
    }

    #[test]
    fn moves_a_fraction_of_the_way_to_the_target() {
        let rect = Rect::new(100.0, 100.0, 100.0, 100.0); // centre (150, 150)
        let next = controller().step(rect, Point::new(350.0, 550.0), &[]);
        assert!((next.x - 110.0).abs() < 1e-9);
        assert!((next.y - 120.0).abs() < 1e-9);
        assert_eq!(next.size(), rect.size());
    }

    #[test]
    fn converges_toward_the_target() {
        let ctl = controller();
        let target = Point::new(500.0, 400.0);
        let mut rect = Rect::new(0.0, 0.0, 200.0, 200.0);
        for _ in 0..200 {
            rect = ctl.step(rect, target, &[]);
        }
        let c = rect.center();
        assert!((c.x - target.x).abs() < 1.0 && (c.y - target.y).abs() < 1.0, "{c:?}");
    }

    #[test]
    fn pushes_out_along_the_smaller_overlap() {
        let ctl = MotionController::new(0.0, Size::new(1000.0, 1000.0), Duration::from_millis(50));
        let neighbor = Rect::new(200.0, 200.0, 100.0, 100.0);

        // Overlaps 20px horizontally, 90px vertically: pushed left by 20.
        let left = ctl.step(Rect::new(120.0, 210.0, 100.0, 100.0), Point::default(), &[neighbor]);
        assert_eq!(left, Rect::new(100.0, 210.0, 100.0, 100.0));

        // Overlaps 90px horizontally, 30px vertically: pushed down by 30.
        let below = ctl.step(Rect::new(210.0, 270.0, 100.0, 100.0), Point::default(), &[neighbor]);
        assert_eq!(below, Rect::new(210.0, 300.0, 100.0, 100.0));

        // Equal overlap resolves horizontally.
        let tie = ctl.step(Rect::new(250.0, 250.0, 100.0, 100.0), Point::default(), &[neighbor]);
        assert_eq!(tie, Rect::new(300.0, 250.0, 100.0, 100.0));
        assert!(!tie.intersects(&neighbor));
    }

    #[test]
    fn output_is_clamped_every_tick() {
        let screen = Size::new(640.0, 480.0);
        let ctl = MotionController::new(0.5, screen, Duration::from_millis(50));
        let wall = Rect::new(0.0, 0.0, 60.0, 480.0);
        let mut rect = Rect::new(300.0, 200.0, 150.0, 150.0);
        let targets = [
            Point::new(-5000.0, -5000.0),
            Point::new(9000.0, 9000.0),
            Point::new(0.0, 240.0),
        ];
        for target in targets {
            for _ in 0..50 {
                rect = ctl.step(rect, target, &[wall]);
                assert!(rect.is_within(screen), "{rect:?}");
            }
        }
    }

    #[test]
    fn separated_popups_stay_separated() {
        let ctl = MotionController::new(0.05, Size::new(2000.0, 2000.0), Duration::from_millis(50));
        let target = Point::new(1000.0, 1000.0);
        let mut a = Rect::new(100.0, 900.0, 200.0, 200.0);
        let mut b = Rect::new(1700.0, 900.0, 200.0, 200.0);
        for _ in 0..300 {
            a = ctl.step(a, target, &[b]);
            b = ctl.step(b, target, &[a]);
        }
        assert!(!a.intersects(&b), "{a:?} vs {b:?}");
    }
}
