// THEORY:
// The `engine` module is the top-level API of the popup system. It ties the leaf
// components together into one object that a driver (the sampling loop, a test, a
// host application) can poke with three verbs: spawn a popup, close them all, shut
// down.
//
// Key architectural principles:
// 1.  **Explicit ownership**: all shared state (registry, target reader, media
//     library, RNG, collaborators) lives in one `EngineShared` behind an `Arc`. There
//     is no module-level state; every worker receives what it needs by handle.
// 2.  **Owned workers**: each popup's motion controller, video frame pump and fade
//     are tokio tasks whose handles are parked on the popup's registry entry, so
//     shutdown can join them and abort stragglers instead of leaking detached tasks.
// 3.  **Recoverable creation**: decoding happens on the blocking pool before the
//     registry is touched. A corrupt file, a missing video backend or a window that
//     refuses to open fails that one spawn with a typed `EngineError`; nothing else
//     is disturbed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::EngineConfig;
use crate::core_modules::audio::AudioSink;
use crate::core_modules::fade::{self, FadeTiming};
use crate::core_modules::geometry::Size;
use crate::core_modules::library::MediaLibrary;
use crate::core_modules::lock;
use crate::core_modules::media::{FrameSource, MediaDecoder, VisualContent};
use crate::core_modules::motion::MotionController;
use crate::core_modules::placement::PlacementSolver;
use crate::core_modules::popup::{Popup, PopupId};
use crate::core_modules::registry::{PopupRegistry, PopupSnapshot};
use crate::core_modules::target::{TargetReader, TargetWriter, target_point};
use crate::core_modules::window::WindowSystem;
use crate::error::{EngineError, MediaError};

struct EngineShared {
    config: EngineConfig,
    registry: Arc<PopupRegistry>,
    target: TargetReader,
    placement: PlacementSolver,
    motion: MotionController,
    fade: FadeTiming,
    windows: Arc<dyn WindowSystem>,
    decoder: Arc<dyn MediaDecoder>,
    audio: Arc<dyn AudioSink>,
    library: Mutex<MediaLibrary>,
    rng: Mutex<StdRng>,
    stopping: Arc<AtomicBool>,
    /// Bumped by every close-all. A spawn that started under an older epoch is
    /// refused admission.
    close_epoch: AtomicU64,
}

/// Handle to the popup engine. Clones share the same engine.
#[derive(Clone)]
pub struct PopupEngine {
    shared: Arc<EngineShared>,
}

impl PopupEngine {
    /// Builds an engine and returns it with the single writer of its target point.
    pub fn new(
        config: EngineConfig,
        windows: Arc<dyn WindowSystem>,
        decoder: Arc<dyn MediaDecoder>,
        audio: Arc<dyn AudioSink>,
        library: MediaLibrary,
    ) -> (Self, TargetWriter) {
        let (writer, target) = target_point(config.screen_center());
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let shared = EngineShared {
            registry: Arc::new(PopupRegistry::new(config.capacity)),
            target,
            placement: PlacementSolver::new(config.screen(), config.placement_attempts),
            motion: MotionController::new(
                config.motion_gain,
                config.screen(),
                config.motion_tick(),
            ),
            fade: config.fade_timing(),
            windows,
            decoder,
            audio,
            library: Mutex::new(library),
            rng: Mutex::new(rng),
            stopping: Arc::new(AtomicBool::new(false)),
            close_epoch: AtomicU64::new(0),
            config,
        };
        (
            Self {
                shared: Arc::new(shared),
            },
            writer,
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &Arc<PopupRegistry> {
        &self.shared.registry
    }

    pub fn target(&self) -> TargetReader {
        self.shared.target.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.stopping.load(Ordering::Acquire)
    }

    pub fn active_ids(&self) -> Vec<PopupId> {
        self.shared.registry.ids()
    }

    pub fn active_len(&self) -> usize {
        self.shared.registry.len()
    }

    /// Active plus still-fading popups.
    pub fn live_len(&self) -> usize {
        self.shared.registry.live_len()
    }

    pub fn snapshot(&self) -> Vec<PopupSnapshot> {
        self.shared.registry.snapshot()
    }

    /// Creates one popup: picks media, decodes it, admits it to the registry (fading
    /// out the oldest popup if the registry is full) and starts its workers.
    pub async fn spawn_popup(&self) -> Result<PopupId, EngineError> {
        let shared = &self.shared;
        if self.is_shutting_down() {
            return Err(EngineError::ShuttingDown);
        }
        let epoch = shared.close_epoch.load(Ordering::Acquire);

        // --- 1. Choose media and size ---
        let (media, size) = {
            let mut rng = lock(&shared.rng);
            let media = lock(&shared.library)
                .next(&mut *rng)
                .ok_or(EngineError::NoMedia)?;
            let [min_side, max_side] = shared.config.popup_size;
            let size = Size::new(
                rng.random_range(min_side..=max_side) as f64,
                rng.random_range(min_side..=max_side) as f64,
            );
            (media, size)
        };
        let kind = media.kind;

        // --- 2. Decode on the blocking pool ---
        let decoder = shared.decoder.clone();
        let (content, track) = tokio::task::spawn_blocking(move || {
            let content = decoder.open_visual(&media, size)?;
            let track = match content {
                VisualContent::Video(_) => decoder.extract_audio(&media),
                VisualContent::Still(_) => None,
            };
            Ok::<_, MediaError>((content, track))
        })
        .await??;

        // --- 3. Admission ---
        // The epoch is compared under the registry lock: a close-all that bumped it
        // earlier refuses this popup, one that bumps it later finds it active.
        let windows = shared.windows.clone();
        let audio = shared.audio.clone();
        let admission = shared.registry.create(
            size,
            |size, obstacles| {
                let mut rng = lock(&shared.rng);
                shared.placement.find_position(size, obstacles, &mut *rng)
            },
            |id, rect| {
                if shared.close_epoch.load(Ordering::Acquire) != epoch {
                    return Err(if self.is_shutting_down() {
                        EngineError::ShuttingDown
                    } else {
                        EngineError::Closed
                    });
                }
                Ok(Popup::open(id, kind, rect, windows, audio)?)
            },
        )?;
        let popup = admission.popup;
        let id = popup.id();
        if !admission.placement.is_clear() {
            debug!("{id}: no free slot found, placed overlapping");
        }
        if let Some(evicted) = admission.evicted {
            debug!("{} evicted to make room for {id}", evicted.id());
            self.retire(evicted);
        }

        // --- 4. Content and workers ---
        if let Some(track) = track {
            popup.attach_audio(track);
        }
        match content {
            VisualContent::Still(frame) => popup.show_frame(&frame),
            VisualContent::Video(source) => {
                let pump = tokio::spawn(pump_frames(self.clone(), popup.clone(), source));
                shared.registry.attach_worker(id, pump);
            }
        }
        let motion = tokio::spawn(shared.motion.drive(
            popup.clone(),
            shared.registry.clone(),
            shared.target.clone(),
            shared.stopping.clone(),
        ));
        shared.registry.attach_worker(id, motion);

        info!("{id} spawned ({kind:?}, {}x{})", size.width, size.height);
        Ok(id)
    }

    /// Fades out every active popup. The active view is empty when this returns; the
    /// fades finish in the background. Returns how many popups were closed.
    ///
    /// Spawns still decoding when this runs are refused admission afterwards with
    /// `EngineError::Closed`.
    pub fn close_all(&self) -> usize {
        self.shared.close_epoch.fetch_add(1, Ordering::AcqRel);
        let closing = self.shared.registry.close_all();
        if !closing.is_empty() {
            info!("closing {} popups", closing.len());
        }
        let count = closing.len();
        for popup in closing {
            self.retire(popup);
        }
        count
    }

    /// Stops the engine: closes every popup, waits one fade for the workers to wind
    /// down, aborts whatever is still running and destroys anything left over.
    pub async fn shutdown(&self) {
        self.shared.stopping.store(true, Ordering::Release);
        self.close_all();

        let entries = self.shared.registry.drain();
        let mut popups = Vec::with_capacity(entries.len());
        let mut workers = Vec::new();
        for entry in entries {
            popups.push(entry.popup);
            workers.extend(entry.workers);
        }
        let aborts: Vec<_> = workers.iter().map(|w| w.abort_handle()).collect();

        let grace = self.shared.fade.duration() + self.shared.config.motion_tick() * 2;
        if tokio::time::timeout(grace, join_all(workers)).await.is_err() {
            warn!("{} workers still running after {grace:?}, aborting", aborts.len());
            for handle in aborts {
                handle.abort();
            }
        }

        for popup in &popups {
            popup.destroy();
        }
        info!("engine shut down ({} popups released)", popups.len());
    }

    /// Takes `popup` out of the active view and starts its fade, unless another
    /// trigger already did.
    fn retire(&self, popup: Arc<Popup>) {
        let id = popup.id();
        self.shared.registry.retire(id);
        if !popup.begin_fade() {
            return;
        }
        let registry = self.shared.registry.clone();
        let timing = self.shared.fade;
        let worker = tokio::spawn(async move {
            fade::run(popup, registry, timing).await;
        });
        self.shared.registry.attach_worker(id, worker);
    }
}

/// Feeds video frames to the popup at the source's pace, then fades it out.
async fn pump_frames(engine: PopupEngine, popup: Arc<Popup>, mut source: Box<dyn FrameSource>) {
    let id = popup.id();
    loop {
        if engine.is_shutting_down() || popup.is_destroyed() {
            return;
        }
        let interval = source.frame_interval();
        let next = tokio::task::spawn_blocking(move || {
            let frame = source.next_frame();
            (source, frame)
        })
        .await;
        let frame = match next {
            Ok((returned, frame)) => {
                source = returned;
                frame
            }
            Err(e) => {
                warn!("{id}: frame worker failed: {e}");
                break;
            }
        };
        match frame {
            Some(Ok(frame)) => popup.show_frame(&frame),
            Some(Err(e)) => {
                warn!("{id}: {e}");
                break;
            }
            None => break,
        }
        tokio::time::sleep(interval).await;
    }
    debug!("{id}: content exhausted");
    engine.retire(popup);
}
