// THEORY:
// The `placement` module answers one question for the registry: where should a new
// popup first appear? It uses plain rejection sampling. Each attempt draws a uniform
// top-left corner on the screen and is accepted if the resulting rectangle overlaps
// no live popup. When the attempt budget runs out the last sample is returned anyway;
// creation never blocks, and the motion engine pushes overlapping popups apart on
// the following ticks.

use crate::core_modules::geometry::{Point, Rect, Size};
use rand::Rng;

/// The outcome of a placement search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// A position whose rectangle overlaps none of the obstacles.
    Clear(Point),
    /// The attempt budget ran out; this is the last sampled position and may overlap.
    Exhausted(Point),
}

impl Placement {
    pub fn position(&self) -> Point {
        match *self {
            Placement::Clear(p) | Placement::Exhausted(p) => p,
        }
    }

    pub fn is_clear(&self) -> bool {
        matches!(self, Placement::Clear(_))
    }
}

/// Randomized search for a non-overlapping starting rectangle.
#[derive(Debug, Clone)]
pub struct PlacementSolver {
    screen: Size,
    attempts: usize,
}

impl PlacementSolver {
    pub fn new(screen: Size, attempts: usize) -> Self {
        Self {
            screen,
            attempts: attempts.max(1),
        }
    }

    /// Samples up to `attempts` positions for a rectangle of `size`.
    pub fn find_position<R: Rng + ?Sized>(
        &self,
        size: Size,
        obstacles: &[Rect],
        rng: &mut R,
    ) -> Placement {
        let max = self.screen.max_origin(size);
        let mut last = Point::default();

        for _ in 0..self.attempts {
            let candidate =
                Point::new(rng.random_range(0.0..=max.x), rng.random_range(0.0..=max.y));
            let rect = Rect::from_origin(candidate, size);
            if obstacles.iter().all(|o| !rect.intersects(o)) {
                return Placement::Clear(candidate);
            }
            last = candidate;
        }

        Placement::Exhausted(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn results_stay_inside_the_screen() {
        let screen = Size::new(1280.0, 720.0);
        let solver = PlacementSolver::new(screen, 100);
        let mut rng = StdRng::seed_from_u64(7);
        let size = Size::new(300.0, 250.0);

        for _ in 0..500 {
            let p = solver.find_position(size, &[], &mut rng).position();
            assert!(Rect::from_origin(p, size).is_within(screen), "{p:?} out of bounds");
        }
    }

    #[test]
    fn finds_the_free_half_of_the_screen() {
        // The left half is blocked; the only free slots are on the right.
        let screen = Size::new(1000.0, 500.0);
        let solver = PlacementSolver::new(screen, 100);
        let mut rng = StdRng::seed_from_u64(42);
        let blocker = Rect::new(0.0, 0.0, 500.0, 500.0);
        let size = Size::new(200.0, 200.0);

        let placement = solver.find_position(size, &[blocker], &mut rng);
        assert!(placement.is_clear());
        assert!(!Rect::from_origin(placement.position(), size).intersects(&blocker));
    }

    #[test]
    fn falls_back_to_an_overlapping_position_when_full() {
        let screen = Size::new(400.0, 400.0);
        let solver = PlacementSolver::new(screen, 25);
        let mut rng = StdRng::seed_from_u64(3);
        let wall = Rect::new(0.0, 0.0, 400.0, 400.0);
        let size = Size::new(100.0, 100.0);

        let placement = solver.find_position(size, &[wall], &mut rng);
        assert!(matches!(placement, Placement::Exhausted(_)));
        assert!(Rect::from_origin(placement.position(), size).is_within(screen));
    }

    #[test]
    fn oversized_popups_are_pinned_to_the_origin() {
        let solver = PlacementSolver::new(Size::new(100.0, 100.0), 0);
        let mut rng = StdRng::seed_from_u64(1);
        let p = solver.find_position(Size::new(150.0, 150.0), &[], &mut rng);
        assert_eq!(p, Placement::Clear(Point::new(0.0, 0.0)));
    }
}
