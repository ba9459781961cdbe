// THEORY:
// `core_modules` holds the building blocks of the popup engine, ordered roughly from
// the leaves up: geometry and placement, the media and window boundaries, the popup
// itself, the registry that owns popups, and the workers (motion, fade) that animate
// them. The spawn scheduler sits beside them as a pure decision function.

pub mod audio;
pub mod fade;
pub mod geometry;
pub mod library;
pub mod media;
pub mod motion;
pub mod placement;
pub mod popup;
pub mod registry;
pub mod spawn_scheduler;
pub mod target;
pub mod window;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks `mutex`, recovering the data if a worker panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
