// THEORY:
// The fade is the only way a popup leaves the screen gracefully. Whatever retires a
// popup (capacity eviction, end of its video, everyone walking away) first wins the
// Active -> FadingOut transition on the popup and then hands it to `run`, which:
//
// 1.  steps the opacity down from 1.0 to exactly 0.0 in equal decrements, sleeping
//     between steps;
// 2.  checks before every step that nobody force-destroyed the popup in the meantime,
//     and quietly stops if they did;
// 3.  at 0.0 destroys the popup (window, audio, temp file) and drops it from the
//     registry.

use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::core_modules::popup::Popup;
use crate::core_modules::registry::PopupRegistry;

/// How the opacity ramp is paced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeTiming {
    /// Number of decrements; the ramp visits `steps + 1` opacity levels.
    pub steps: u32,
    pub step_delay: Duration,
}

impl Default for FadeTiming {
    fn default() -> Self {
        Self {
            steps: 10,
            step_delay: Duration::from_millis(30),
        }
    }
}

impl FadeTiming {
    /// Wall time of a full fade.
    pub fn duration(&self) -> Duration {
        self.step_delay * (self.steps + 1)
    }

    /// Opacity at `level`, counting down from `steps` (1.0) to 0 (0.0).
    fn opacity_at(&self, level: u32) -> f32 {
        if self.steps == 0 {
            return 0.0;
        }
        level as f32 / self.steps as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeOutcome {
    /// Reached 0.0 and destroyed the popup.
    Completed,
    /// Someone else destroyed the popup mid-fade.
    Aborted,
}

/// Fades `popup` out and retires it. The caller must have won `begin_fade`.
pub async fn run(
    popup: Arc<Popup>,
    registry: Arc<PopupRegistry>,
    timing: FadeTiming,
) -> FadeOutcome {
    for level in (0..=timing.steps).rev() {
        if popup.is_destroyed() {
            debug!("{} fade aborted at level {level}", popup.id());
            registry.remove(popup.id());
            return FadeOutcome::Aborted;
        }
        popup.set_opacity(timing.opacity_at(level));
        tokio::time::sleep(timing.step_delay).await;
    }

    popup.destroy();
    registry.remove(popup.id());
    debug!("{} faded out", popup.id());
    FadeOutcome::Completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::audio::SilentAudio;
    use crate::core_modules::geometry::{Point, Rect, Size};
    use crate::core_modules::media::MediaKind;
    use crate::core_modules::placement::Placement;
    use crate::core_modules::popup::PopupState;
    use crate::core_modules::window::HeadlessWindows;

    fn admit(registry: &PopupRegistry, windows: &Arc<HeadlessWindows>) -> Arc<Popup> {
        let windows = windows.clone();
        let audio = Arc::new(SilentAudio::new());
        registry
            .create(
                Size::new(40.0, 40.0),
                |_, _| Placement::Clear(Point::default()),
                |id, rect: Rect| Popup::open(id, MediaKind::Image, rect, windows, audio),
            )
            .unwrap()
            .popup
    }

    #[tokio::test(start_paused = true)]
    async fn opacity_ramps_to_exactly_zero_and_destroys_once() {
        let registry = Arc::new(PopupRegistry::new(5));
        let windows = Arc::new(HeadlessWindows::new());
        let popup = admit(&registry, &windows);
        assert!(popup.begin_fade());

        let outcome = run(popup.clone(), registry.clone(), FadeTiming::default()).await;
        assert_eq!(outcome, FadeOutcome::Completed);
        assert_eq!(popup.state(), PopupState::Destroyed);
        assert_eq!(registry.live_len(), 0);

        let (_, record) = windows.records().pop().unwrap();
        let history = record.opacity_history;
        assert_eq!(history.first(), Some(&1.0));
        assert_eq!(history.last(), Some(&0.0));
        assert!(history.windows(2).all(|w| w[0] >= w[1]), "{history:?}");
        assert_eq!(record.destroy_calls, 1);
        assert_eq!(windows.stray_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn takes_about_a_third_of_a_second() {
        let registry = Arc::new(PopupRegistry::new(5));
        let windows = Arc::new(HeadlessWindows::new());
        let popup = admit(&registry, &windows);
        popup.begin_fade();

        let started = tokio::time::Instant::now();
        run(popup, registry, FadeTiming::default()).await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(330), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(400), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn stops_quietly_when_destroyed_elsewhere() {
        let registry = Arc::new(PopupRegistry::new(5));
        let windows = Arc::new(HeadlessWindows::new());
        let popup = admit(&registry, &windows);
        popup.begin_fade();

        let fade = tokio::spawn(run(popup.clone(), registry.clone(), FadeTiming::default()));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(popup.destroy());

        assert_eq!(fade.await.unwrap(), FadeOutcome::Aborted);
        let (_, record) = windows.records().pop().unwrap();
        assert_eq!(record.destroy_calls, 1);
        assert!(record.opacity_history.len() < 12);
        assert_eq!(windows.stray_calls(), 0);
    }
}
