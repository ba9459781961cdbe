// THEORY:
// The `PopupRegistry` is the single owner of every live popup. It is a bounded FIFO:
// insertion order is eviction order, and the registry never holds more active popups
// than its capacity.
//
// Key architectural principles:
// 1.  **One critical section**: every mutation (create, remove, close-all, drain)
//     runs under one mutex, so no two mutations interleave and the "active popups"
//     view handed to placement and motion is always consistent.
// 2.  **Evict before insert**: when the registry is full, `create` pops the oldest
//     entry before pushing the new one, inside the same critical section. An outside
//     observer can never see `capacity + 1` active popups.
// 3.  **Active vs. retiring**: popups that were evicted, closed or ran out of
//     content leave the active view immediately but stay owned by the registry (as
//     "retiring") until their fade finishes and calls `remove`. This keeps their
//     worker handles reachable for shutdown without counting them against capacity.
// 4.  **Idempotent removal**: eviction, end-of-content and close-all can all race to
//     retire the same popup; `retire` and `remove` of an absent id are silent no-ops.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::core_modules::geometry::{Rect, Size};
use crate::core_modules::lock;
use crate::core_modules::placement::Placement;
use crate::core_modules::popup::{Popup, PopupId, PopupState};

/// A popup together with the background workers that serve it.
pub struct RegistryEntry {
    pub popup: Arc<Popup>,
    pub workers: Vec<JoinHandle<()>>,
}

impl RegistryEntry {
    fn new(popup: Arc<Popup>) -> Self {
        Self {
            popup,
            workers: Vec::new(),
        }
    }
}

/// A read-only view of one active popup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopupSnapshot {
    pub id: PopupId,
    pub rect: Rect,
    pub state: PopupState,
    pub created_at: Instant,
}

/// The result of a successful `create`.
#[derive(Debug)]
pub struct Admission {
    pub popup: Arc<Popup>,
    pub placement: Placement,
    /// The oldest popup, pushed out to make room. The caller owns fading it.
    pub evicted: Option<Arc<Popup>>,
}

#[derive(Default)]
struct RegistryInner {
    active: VecDeque<RegistryEntry>,
    retiring: Vec<RegistryEntry>,
    next_id: u64,
}

/// Bounded, ordered collection of live popups.
pub struct PopupRegistry {
    capacity: usize,
    inner: Mutex<RegistryInner>,
}

impl PopupRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Admits a new popup of `size`.
    ///
    /// `place` receives the rectangles the newcomer must avoid (the current active
    /// set minus the popup about to be evicted) and `build` turns the assigned id and
    /// rectangle into a popup. If `build` fails nothing is evicted and no id is used.
    pub fn create<P, B, E>(&self, size: Size, place: P, build: B) -> Result<Admission, E>
    where
        P: FnOnce(Size, &[Rect]) -> Placement,
        B: FnOnce(PopupId, Rect) -> Result<Popup, E>,
    {
        let mut inner = lock(&self.inner);
        let at_capacity = inner.active.len() >= self.capacity;

        // --- 1. Placement against the survivors ---
        let obstacles: Vec<Rect> = inner
            .active
            .iter()
            .skip(usize::from(at_capacity))
            .filter(|e| !e.popup.is_destroyed())
            .map(|e| e.popup.rect())
            .collect();
        let placement = place(size, &obstacles);

        // --- 2. Construction ---
        let id = PopupId(inner.next_id + 1);
        let popup = Arc::new(build(id, Rect::from_origin(placement.position(), size))?);
        inner.next_id = id.0;

        // --- 3. Eviction, then insertion ---
        let mut evicted = None;
        if at_capacity {
            if let Some(oldest) = inner.active.pop_front() {
                evicted = Some(oldest.popup.clone());
                inner.retiring.push(oldest);
            }
        }
        inner.active.push_back(RegistryEntry::new(popup.clone()));

        Ok(Admission {
            popup,
            placement,
            evicted,
        })
    }

    /// Drops the popup's entry, active or retiring. Returns false if it was absent.
    pub fn remove(&self, id: PopupId) -> bool {
        let removed = {
            let mut inner = lock(&self.inner);
            if let Some(pos) = inner.active.iter().position(|e| e.popup.id() == id) {
                inner.active.remove(pos)
            } else if let Some(pos) = inner.retiring.iter().position(|e| e.popup.id() == id) {
                Some(inner.retiring.swap_remove(pos))
            } else {
                None
            }
        };
        // The entry (and possibly the last Arc of the popup) is dropped outside the lock.
        removed.is_some()
    }

    /// Moves an active popup to the retiring set, where it no longer counts against
    /// capacity or acts as an obstacle. Returns false if it was not active.
    pub fn retire(&self, id: PopupId) -> bool {
        let mut inner = lock(&self.inner);
        let Some(pos) = inner.active.iter().position(|e| e.popup.id() == id) else {
            return false;
        };
        if let Some(entry) = inner.active.remove(pos) {
            inner.retiring.push(entry);
        }
        true
    }

    /// Attaches a worker to a popup's entry so shutdown can join it. Returns false
    /// (leaving the task detached) when the popup is no longer registered.
    pub fn attach_worker(&self, id: PopupId, worker: JoinHandle<()>) -> bool {
        let mut inner = lock(&self.inner);
        let RegistryInner {
            active, retiring, ..
        } = &mut *inner;
        match active
            .iter_mut()
            .chain(retiring.iter_mut())
            .find(|e| e.popup.id() == id)
        {
            Some(entry) => {
                entry.workers.retain(|w| !w.is_finished());
                entry.workers.push(worker);
                true
            }
            None => false,
        }
    }

    /// The active popups in creation order.
    pub fn snapshot(&self) -> Vec<PopupSnapshot> {
        lock(&self.inner)
            .active
            .iter()
            .map(|e| PopupSnapshot {
                id: e.popup.id(),
                rect: e.popup.rect(),
                state: e.popup.state(),
                created_at: e.popup.created_at(),
            })
            .collect()
    }

    /// Rectangles of every other live, active popup, in creation order.
    pub fn obstacles_except(&self, id: PopupId) -> Vec<Rect> {
        lock(&self.inner)
            .active
            .iter()
            .filter(|e| e.popup.id() != id && !e.popup.is_destroyed())
            .map(|e| e.popup.rect())
            .collect()
    }

    pub fn get(&self, id: PopupId) -> Option<Arc<Popup>> {
        let inner = lock(&self.inner);
        inner
            .active
            .iter()
            .chain(inner.retiring.iter())
            .find(|e| e.popup.id() == id)
            .map(|e| e.popup.clone())
    }

    /// Empties the active view. Every formerly active popup is returned so the caller
    /// can fade it; each stays owned (as retiring) until its fade calls `remove`.
    pub fn close_all(&self) -> Vec<Arc<Popup>> {
        let mut inner = lock(&self.inner);
        let closing: Vec<RegistryEntry> = inner.active.drain(..).collect();
        let popups = closing.iter().map(|e| e.popup.clone()).collect();
        inner.retiring.extend(closing);
        popups
    }

    /// Hands every entry, active and retiring, to the caller and leaves the registry
    /// empty. Used by shutdown to join or abort all workers.
    pub fn drain(&self) -> Vec<RegistryEntry> {
        let mut inner = lock(&self.inner);
        let mut all: Vec<RegistryEntry> = inner.active.drain(..).collect();
        all.append(&mut inner.retiring);
        all
    }

    pub fn ids(&self) -> Vec<PopupId> {
        lock(&self.inner).active.iter().map(|e| e.popup.id()).collect()
    }

    /// Number of active popups (never above capacity).
    pub fn len(&self) -> usize {
        lock(&self.inner).active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Active plus retiring popups: everything still holding a window.
    pub fn live_len(&self) -> usize {
        let inner = lock(&self.inner);
        inner.active.len() + inner.retiring.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::audio::SilentAudio;
    use crate::core_modules::geometry::Point;
    use crate::core_modules::media::MediaKind;
    use crate::core_modules::window::HeadlessWindows;
    use crate::error::WindowError;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    struct Fixture {
        registry: PopupRegistry,
        windows: Arc<HeadlessWindows>,
        audio: Arc<SilentAudio>,
    }

    impl Fixture {
        fn new(capacity: usize) -> Self {
            Self {
                registry: PopupRegistry::new(capacity),
                windows: Arc::new(HeadlessWindows::new()),
                audio: Arc::new(SilentAudio::new()),
            }
        }

        fn create(&self) -> Admission {
            let windows = self.windows.clone();
            let audio = self.audio.clone();
            self.registry
                .create(
                    Size::new(50.0, 50.0),
                    |_, _| Placement::Clear(Point::new(0.0, 0.0)),
                    |id, rect| Popup::open(id, MediaKind::Image, rect, windows, audio),
                )
                .expect("headless windows never fail")
        }
    }

    #[test]
    fn sixth_popup_evicts_the_first() {
        let fx = Fixture::new(5);
        for _ in 0..5 {
            assert!(fx.create().evicted.is_none());
        }
        let admission = fx.create();
        assert_eq!(admission.evicted.map(|p| p.id()), Some(PopupId(1)));
        assert_eq!(
            fx.registry.ids(),
            vec![PopupId(2), PopupId(3), PopupId(4), PopupId(5), PopupId(6)]
        );
        // The evicted popup is still owned until its fade removes it.
        assert_eq!(fx.registry.live_len(), 6);
        assert!(fx.registry.remove(PopupId(1)));
        assert_eq!(fx.registry.live_len(), 5);
    }

    #[test]
    fn remove_is_idempotent() {
        let fx = Fixture::new(2);
        let id = fx.create().popup.id();
        assert!(fx.registry.remove(id));
        assert!(!fx.registry.remove(id));
        assert!(fx.registry.is_empty());
    }

    #[test]
    fn placement_ignores_the_popup_being_evicted() {
        let fx = Fixture::new(2);
        fx.create();
        fx.create();
        let windows = fx.windows.clone();
        let audio = fx.audio.clone();
        let mut seen = 0;
        fx.registry
            .create(
                Size::new(10.0, 10.0),
                |_, obstacles| {
                    seen = obstacles.len();
                    Placement::Clear(Point::new(0.0, 0.0))
                },
                |id, rect| Popup::open(id, MediaKind::Image, rect, windows, audio),
            )
            .unwrap();
        assert_eq!(seen, 1);
    }

    #[test]
    fn failed_build_leaves_the_registry_untouched() {
        let fx = Fixture::new(1);
        fx.create();
        let result = fx.registry.create(
            Size::new(10.0, 10.0),
            |_, _| Placement::Clear(Point::default()),
            |_, _| Err::<Popup, _>(WindowError::Create("no display".into())),
        );
        assert!(result.is_err());
        assert_eq!(fx.registry.ids(), vec![PopupId(1)]);
        assert_eq!(fx.create().popup.id(), PopupId(2));
    }

    #[test]
    fn close_all_empties_the_active_view() {
        let fx = Fixture::new(5);
        for _ in 0..3 {
            fx.create();
        }
        let closing = fx.registry.close_all();
        assert_eq!(closing.len(), 3);
        assert!(fx.registry.is_empty());
        assert_eq!(fx.registry.live_len(), 3);
        assert!(fx.registry.close_all().is_empty());

        for popup in closing {
            assert!(fx.registry.remove(popup.id()));
        }
        assert_eq!(fx.registry.live_len(), 0);
    }

    #[test]
    fn retired_popups_leave_the_active_view_but_stay_owned() {
        let fx = Fixture::new(2);
        let first = fx.create().popup;
        let second = fx.create().popup;

        assert!(fx.registry.retire(first.id()));
        assert!(!fx.registry.retire(first.id()));
        assert_eq!(fx.registry.ids(), vec![second.id()]);
        assert!(fx.registry.obstacles_except(second.id()).is_empty());
        assert_eq!(fx.registry.live_len(), 2);
        assert!(fx.registry.get(first.id()).is_some());

        // The freed slot is reused without evicting anyone.
        assert!(fx.create().evicted.is_none());
        assert!(fx.registry.remove(first.id()));
        assert_eq!(fx.registry.live_len(), 2);
    }

    #[test]
    fn capacity_and_fifo_hold_for_random_operations() {
        let fx = Fixture::new(5);
        let mut rng = StdRng::seed_from_u64(99);

        for _ in 0..400 {
            let before = fx.registry.snapshot();
            match rng.random_range(0..10) {
                0..=6 => {
                    let admission = fx.create();
                    if let Some(evicted) = admission.evicted {
                        let oldest = before.iter().min_by_key(|s| (s.created_at, s.id)).unwrap();
                        assert_eq!(evicted.id(), oldest.id);
                        fx.registry.remove(evicted.id());
                    }
                }
                7 | 8 => {
                    if let Some(s) = before.get(rng.random_range(0..before.len().max(1))) {
                        fx.registry.remove(s.id);
                    }
                }
                _ => {
                    for popup in fx.registry.close_all() {
                        fx.registry.remove(popup.id());
                    }
                }
            }
            assert!(fx.registry.len() <= fx.registry.capacity());
        }
    }
}
