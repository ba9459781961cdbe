// THEORY:
// The `MediaLibrary` decides *what* the next popup shows. Images and videos are each
// kept in a shuffle bag: files are drawn without replacement so the same clip does not
// come up twice in a row, and the bag is refilled and reshuffled once it runs dry.
// Every draw first flips a coin between image and video, falling back to the other
// kind when one folder is empty.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::core_modules::media::{MediaKind, MediaRef};
use crate::error::MediaError;

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];
const VIDEO_EXTENSIONS: [&str; 1] = ["mp4"];

/// Draw-without-replacement over a fixed set of items.
#[derive(Debug, Clone, Default)]
struct ShuffleBag {
    all: Vec<PathBuf>,
    remaining: Vec<PathBuf>,
}

impl ShuffleBag {
    fn new(all: Vec<PathBuf>) -> Self {
        Self {
            all,
            remaining: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<PathBuf> {
        if self.remaining.is_empty() {
            self.remaining = self.all.clone();
            self.remaining.shuffle(rng);
        }
        self.remaining.pop()
    }
}

/// The pool of images and videos popups are drawn from.
#[derive(Debug, Clone, Default)]
pub struct MediaLibrary {
    images: ShuffleBag,
    videos: ShuffleBag,
}

impl MediaLibrary {
    pub fn new(images: Vec<PathBuf>, videos: Vec<PathBuf>) -> Self {
        Self {
            images: ShuffleBag::new(images),
            videos: ShuffleBag::new(videos),
        }
    }

    /// Collects the media files found directly inside the two folders. A folder that
    /// does not exist contributes nothing.
    pub fn scan(image_dir: Option<&Path>, video_dir: Option<&Path>) -> Result<Self, MediaError> {
        let images = match image_dir {
            Some(dir) => list_files(dir, &IMAGE_EXTENSIONS)?,
            None => Vec::new(),
        };
        let videos = match video_dir {
            Some(dir) => list_files(dir, &VIDEO_EXTENSIONS)?,
            None => Vec::new(),
        };
        info!("media library: {} images, {} videos", images.len(), videos.len());
        Ok(Self::new(images, videos))
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.videos.is_empty()
    }

    pub fn len(&self, kind: MediaKind) -> usize {
        match kind {
            MediaKind::Image => self.images.all.len(),
            MediaKind::Video => self.videos.all.len(),
        }
    }

    /// Picks the next piece of media, or `None` when both folders are empty.
    pub fn next<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<MediaRef> {
        let prefer_image = rng.random_bool(0.5);
        let kind = match (prefer_image, self.images.is_empty(), self.videos.is_empty()) {
            (_, true, true) => return None,
            (true, false, _) | (false, false, true) => MediaKind::Image,
            _ => MediaKind::Video,
        };
        let bag = match kind {
            MediaKind::Image => &mut self.images,
            MediaKind::Video => &mut self.videos,
        };
        bag.draw(rng).map(|path| MediaRef { kind, path })
    }
}

fn list_files(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, MediaError> {
    if !dir.is_dir() {
        warn!("media folder {} does not exist", dir.display());
        return Ok(Vec::new());
    }
    let scan_err = |source| MediaError::Scan {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(scan_err)? {
        let path = entry.map_err(scan_err)?.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
            .unwrap_or(false);
        if matches && path.is_file() {
            files.push(path);
        }
    }
    // read_dir order is platform dependent; sort so seeded runs repeat.
    files.sort();
    Ok(files)
}
