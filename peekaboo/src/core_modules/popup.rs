// THEORY:
// A `Popup` is one overlay on screen and the sole owner of the resources behind it:
// the overlay window and, for videos, a temporary soundtrack. It is shared between
// the registry and the popup's workers as an `Arc<Popup>`, so every field that
// changes after creation sits behind interior mutability.
//
// Key architectural principles:
// 1.  **Atomic lifecycle**: `state` is a small atomic state machine
//     (Active -> FadingOut -> Destroyed). `begin_fade` and `destroy` are the only
//     transitions, and both are compare-and-swap based, so two triggers racing for
//     the same popup (eviction vs. end-of-video vs. close-all) collapse into one.
// 2.  **Release exactly once**: the window handle and the temp audio live in an
//     `Option` that is `take`n on release. `destroy` releases them eagerly; `Drop`
//     releases whatever is left, which covers aborted workers and shutdown.
// 3.  **Write-only window**: every geometry or opacity change is first recorded on
//     the popup, then pushed to the window. Nothing is ever read back from the OS.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use image::RgbaImage;
use log::{debug, warn};
use tokio::time::Instant;

use crate::core_modules::audio::{AudioSink, TempAudio};
use crate::core_modules::geometry::{Rect, Size};
use crate::core_modules::lock;
use crate::core_modules::media::MediaKind;
use crate::core_modules::window::{WindowHandle, WindowSystem};
use crate::error::WindowError;

/// Identifier assigned by the registry, stable for the popup's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PopupId(pub u64);

impl fmt::Display for PopupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "popup#{}", self.0)
    }
}

/// Lifecycle of a popup. Spawning is folded into `Active` once the popup is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PopupState {
    Active = 0,
    FadingOut = 1,
    Destroyed = 2,
}

impl PopupState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => PopupState::Active,
            1 => PopupState::FadingOut,
            _ => PopupState::Destroyed,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PopupView {
    rect: Rect,
    opacity: f32,
}

#[derive(Default)]
struct PopupResources {
    window: Option<WindowHandle>,
    audio: Option<TempAudio>,
}

/// One on-screen overlay instance.
pub struct Popup {
    id: PopupId,
    kind: MediaKind,
    created_at: Instant,
    state: AtomicU8,
    view: Mutex<PopupView>,
    resources: Mutex<PopupResources>,
    windows: Arc<dyn WindowSystem>,
    audio_sink: Arc<dyn AudioSink>,
}

impl Popup {
    /// Creates the overlay window at `rect` and returns an active popup owning it.
    pub fn open(
        id: PopupId,
        kind: MediaKind,
        rect: Rect,
        windows: Arc<dyn WindowSystem>,
        audio_sink: Arc<dyn AudioSink>,
    ) -> Result<Self, WindowError> {
        let handle = windows.create_overlay(rect)?;
        windows.set_opacity(handle, 1.0);
        debug!("{id} opened {kind:?} at {rect:?}");
        Ok(Self {
            id,
            kind,
            created_at: Instant::now(),
            state: AtomicU8::new(PopupState::Active as u8),
            view: Mutex::new(PopupView { rect, opacity: 1.0 }),
            resources: Mutex::new(PopupResources {
                window: Some(handle),
                audio: None,
            }),
            windows,
            audio_sink,
        })
    }

    pub fn id(&self) -> PopupId {
        self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn state(&self) -> PopupState {
        PopupState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_destroyed(&self) -> bool {
        self.state() == PopupState::Destroyed
    }

    pub fn rect(&self) -> Rect {
        lock(&self.view).rect
    }

    pub fn size(&self) -> Size {
        self.rect().size()
    }

    pub fn opacity(&self) -> f32 {
        lock(&self.view).opacity
    }

    /// Commits a new position and forwards it to the window.
    pub fn set_rect(&self, rect: Rect) {
        let resources = lock(&self.resources);
        let Some(handle) = resources.window else {
            return;
        };
        lock(&self.view).rect = rect;
        self.windows.set_rect(handle, rect);
    }

    pub fn set_opacity(&self, opacity: f32) {
        let opacity = opacity.clamp(0.0, 1.0);
        let resources = lock(&self.resources);
        let Some(handle) = resources.window else {
            return;
        };
        lock(&self.view).opacity = opacity;
        self.windows.set_opacity(handle, opacity);
    }

    pub fn show_frame(&self, frame: &RgbaImage) {
        let resources = lock(&self.resources);
        if let Some(handle) = resources.window {
            self.windows.set_image(handle, frame);
        }
    }

    /// Starts the soundtrack. The popup keeps the file until it is destroyed; if
    /// playback fails the file is dropped (and deleted) straight away.
    pub fn attach_audio(&self, track: TempAudio) {
        let mut resources = lock(&self.resources);
        if resources.window.is_none() {
            return;
        }
        match self.audio_sink.play(self.id, track.path()) {
            Ok(()) => resources.audio = Some(track),
            Err(e) => warn!("{}: {e}", self.id),
        }
    }

    /// Active -> FadingOut. Returns false when the popup is already fading or gone.
    pub fn begin_fade(&self) -> bool {
        self.state
            .compare_exchange(
                PopupState::Active as u8,
                PopupState::FadingOut as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Moves the popup to Destroyed and releases its window and audio. Only the first
    /// caller does any work; later callers get `false`.
    pub fn destroy(&self) -> bool {
        let previous = self.state.swap(PopupState::Destroyed as u8, Ordering::AcqRel);
        if PopupState::from_u8(previous) == PopupState::Destroyed {
            return false;
        }
        self.release();
        debug!("{} destroyed", self.id);
        true
    }

    fn release(&self) {
        let (window, audio) = {
            let mut resources = lock(&self.resources);
            (resources.window.take(), resources.audio.take())
        };
        if let Some(handle) = window {
            self.windows.destroy(handle);
        }
        if let Some(track) = audio {
            self.audio_sink.stop(self.id);
            if let Err(e) = track.release() {
                warn!("{}: {e}", self.id);
            }
        }
    }
}

impl Drop for Popup {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Popup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Popup")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("rect", &self.rect())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::audio::SilentAudio;
    use crate::core_modules::window::HeadlessWindows;

    fn open(windows: &Arc<HeadlessWindows>, audio: &Arc<SilentAudio>) -> Popup {
        Popup::open(
            PopupId(1),
            MediaKind::Video,
            Rect::new(10.0, 10.0, 100.0, 80.0),
            windows.clone(),
            audio.clone(),
        )
        .unwrap()
    }

    #[test]
    fn destroy_releases_everything_once() {
        let windows = Arc::new(HeadlessWindows::new());
        let audio = Arc::new(SilentAudio::new());
        let popup = open(&windows, &audio);
        let track = TempAudio::create().unwrap();
        let track_path = track.path().to_path_buf();
        popup.attach_audio(track);
        assert_eq!(audio.playing_count(), 1);

        assert!(popup.destroy());
        assert!(!popup.destroy());
        drop(popup);

        assert_eq!(windows.live_count(), 0);
        assert_eq!(windows.stray_calls(), 0);
        assert_eq!(audio.playing_count(), 0);
        assert!(!track_path.exists());
    }

    #[test]
    fn fade_can_only_begin_once() {
        let windows = Arc::new(HeadlessWindows::new());
        let audio = Arc::new(SilentAudio::new());
        let popup = open(&windows, &audio);
        assert!(popup.begin_fade());
        assert!(!popup.begin_fade());
        assert_eq!(popup.state(), PopupState::FadingOut);
        popup.destroy();
        assert!(!popup.begin_fade());
    }

    #[test]
    fn dropping_a_live_popup_still_releases_the_window() {
        let windows = Arc::new(HeadlessWindows::new());
        let audio = Arc::new(SilentAudio::new());
        drop(open(&windows, &audio));
        assert_eq!(windows.live_count(), 0);
    }

    #[test]
    fn writes_after_destroy_are_ignored() {
        let windows = Arc::new(HeadlessWindows::new());
        let audio = Arc::new(SilentAudio::new());
        let popup = open(&windows, &audio);
        popup.destroy();
        popup.set_rect(Rect::new(0.0, 0.0, 1.0, 1.0));
        popup.set_opacity(0.3);
        assert_eq!(windows.stray_calls(), 0);
    }
}
