// THEORY:
// The engine never draws pixels itself. It talks to whatever windowing layer the
// host provides through the `WindowSystem` trait: create an undecorated overlay,
// move it, change its opacity, hand it a bitmap, destroy it. The engine only ever
// writes to windows and never reads geometry back from the OS; the popup's own
// rectangle is the source of truth.
//
// `HeadlessWindows` is an in-memory implementation. The tester binary runs on it
// when no display is wanted, and the test-suite uses its bookkeeping to prove that
// every handle is destroyed exactly once.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use image::RgbaImage;
use log::{debug, warn};

use crate::core_modules::geometry::Rect;
use crate::core_modules::lock;
use crate::error::WindowError;

/// Opaque handle to an overlay window owned by exactly one popup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowHandle(pub u64);

/// The windowing primitives the engine consumes.
pub trait WindowSystem: Send + Sync {
    fn create_overlay(&self, rect: Rect) -> Result<WindowHandle, WindowError>;
    fn set_rect(&self, handle: WindowHandle, rect: Rect);
    fn set_opacity(&self, handle: WindowHandle, opacity: f32);
    fn set_image(&self, handle: WindowHandle, frame: &RgbaImage);
    fn destroy(&self, handle: WindowHandle);
}

/// Everything a headless window has been told.
#[derive(Debug, Clone, Default)]
pub struct WindowRecord {
    pub rect: Rect,
    pub opacity_history: Vec<f32>,
    pub frames_shown: u64,
    pub destroy_calls: u32,
}

#[derive(Default)]
struct HeadlessState {
    windows: HashMap<WindowHandle, WindowRecord>,
    stray_calls: u64,
}

/// A `WindowSystem` that keeps windows in memory and logs each operation.
#[derive(Default)]
pub struct HeadlessWindows {
    next_handle: AtomicU64,
    state: Mutex<HeadlessState>,
}

impl HeadlessWindows {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of overlays created and not yet destroyed.
    pub fn live_count(&self) -> usize {
        lock(&self.state)
            .windows
            .values()
            .filter(|w| w.destroy_calls == 0)
            .count()
    }

    pub fn created_count(&self) -> usize {
        lock(&self.state).windows.len()
    }

    /// Calls made against handles that were unknown or already destroyed.
    pub fn stray_calls(&self) -> u64 {
        lock(&self.state).stray_calls
    }

    pub fn record(&self, handle: WindowHandle) -> Option<WindowRecord> {
        lock(&self.state).windows.get(&handle).cloned()
    }

    pub fn records(&self) -> Vec<(WindowHandle, WindowRecord)> {
        let state = lock(&self.state);
        let mut all: Vec<_> = state.windows.iter().map(|(h, r)| (*h, r.clone())).collect();
        all.sort_by_key(|(h, _)| *h);
        all
    }

    fn with_live<F: FnOnce(&mut WindowRecord)>(&self, handle: WindowHandle, op: &str, f: F) {
        let mut state = lock(&self.state);
        match state.windows.get_mut(&handle) {
            Some(record) if record.destroy_calls == 0 => f(record),
            _ => {
                warn!("{op} on dead window {handle:?}");
                state.stray_calls += 1;
            }
        }
    }
}

impl WindowSystem for HeadlessWindows {
    fn create_overlay(&self, rect: Rect) -> Result<WindowHandle, WindowError> {
        let handle = WindowHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        debug!("create overlay {handle:?} at {rect:?}");
        lock(&self.state).windows.insert(
            handle,
            WindowRecord {
                rect,
                ..WindowRecord::default()
            },
        );
        Ok(handle)
    }

    fn set_rect(&self, handle: WindowHandle, rect: Rect) {
        self.with_live(handle, "set_rect", |w| w.rect = rect);
    }

    fn set_opacity(&self, handle: WindowHandle, opacity: f32) {
        self.with_live(handle, "set_opacity", |w| w.opacity_history.push(opacity));
    }

    fn set_image(&self, handle: WindowHandle, _frame: &RgbaImage) {
        self.with_live(handle, "set_image", |w| w.frames_shown += 1);
    }

    fn destroy(&self, handle: WindowHandle) {
        let mut state = lock(&self.state);
        match state.windows.get_mut(&handle) {
            Some(record) => {
                record.destroy_calls += 1;
                if record.destroy_calls > 1 {
                    warn!("window {handle:?} destroyed {} times", record.destroy_calls);
                    state.stray_calls += 1;
                } else {
                    debug!("destroy overlay {handle:?}");
                }
            }
            None => {
                warn!("destroy on unknown window {handle:?}");
                state.stray_calls += 1;
            }
        }
    }
}
