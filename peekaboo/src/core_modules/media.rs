// THEORY:
// The `media` module is the boundary between the engine and whatever turns files
// into pixels. The engine asks a `MediaDecoder` for two things when it creates a
// popup:
//
// 1.  **Visual content**: either a single still frame (images) or a `FrameSource`
//     that yields frames at the clip's native pacing until it runs dry (videos).
//     A decode failure aborts that one popup and nothing else.
// 2.  **Audio**: an optional temporary soundtrack file, owned by the popup and
//     deleted with it.
//
// `FileMediaDecoder` is the stock implementation. Stills go through the `image`
// crate; video frames come from a pluggable `VideoBackend` so that heavyweight codec
// stacks stay out of the core library; audio comes from `ffmpeg` when configured.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use image::imageops::FilterType;

use crate::core_modules::audio::{TempAudio, extract_with_ffmpeg};
use crate::core_modules::geometry::Size;
use crate::error::MediaError;

/// Which kind of popup a piece of media produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
}

/// A reference to a media file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub path: PathBuf,
}

impl MediaRef {
    pub fn image(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: MediaKind::Image,
            path: path.into(),
        }
    }

    pub fn video(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: MediaKind::Video,
            path: path.into(),
        }
    }
}

/// A stream of decoded frames at the source's native rate.
pub trait FrameSource: Send {
    /// Delay between consecutive frames.
    fn frame_interval(&self) -> Duration;
    /// The next frame, `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Option<Result<RgbaImage, MediaError>>;
}

/// What a popup shows.
pub enum VisualContent {
    Still(RgbaImage),
    Video(Box<dyn FrameSource>),
}

impl std::fmt::Debug for VisualContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VisualContent::Still(img) => write!(f, "Still({}x{})", img.width(), img.height()),
            VisualContent::Video(src) => write!(f, "Video({:?}/frame)", src.frame_interval()),
        }
    }
}

/// Opens video files as frame sources scaled to the popup size.
pub trait VideoBackend: Send + Sync {
    fn open(&self, path: &Path, size: Size) -> Result<Box<dyn FrameSource>, MediaError>;
}

/// The media pipeline contract consumed by the engine.
pub trait MediaDecoder: Send + Sync {
    fn open_visual(&self, media: &MediaRef, size: Size) -> Result<VisualContent, MediaError>;
    fn extract_audio(&self, media: &MediaRef) -> Option<TempAudio>;
}

/// Decodes media straight from disk.
#[derive(Default)]
pub struct FileMediaDecoder {
    video: Option<Arc<dyn VideoBackend>>,
    ffmpeg: Option<PathBuf>,
}

impl FileMediaDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_video_backend(mut self, backend: Arc<dyn VideoBackend>) -> Self {
        self.video = Some(backend);
        self
    }

    pub fn with_ffmpeg(mut self, ffmpeg: impl Into<PathBuf>) -> Self {
        self.ffmpeg = Some(ffmpeg.into());
        self
    }
}

/// Loads an image and scales it to exactly `size`.
pub fn load_still(path: &Path, size: Size) -> Result<RgbaImage, MediaError> {
    let (width, height) = size.pixels();
    let img = image::open(path).map_err(|source| MediaError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.resize_exact(width, height, FilterType::Triangle).to_rgba8())
}

impl MediaDecoder for FileMediaDecoder {
    fn open_visual(&self, media: &MediaRef, size: Size) -> Result<VisualContent, MediaError> {
        match media.kind {
            MediaKind::Image => load_still(&media.path, size).map(VisualContent::Still),
            MediaKind::Video => match &self.video {
                Some(backend) => backend.open(&media.path, size).map(VisualContent::Video),
                None => Err(MediaError::NoVideoBackend(media.path.clone())),
            },
        }
    }

    fn extract_audio(&self, media: &MediaRef) -> Option<TempAudio> {
        if media.kind != MediaKind::Video {
            return None;
        }
        let ffmpeg = self.ffmpeg.as_deref()?;
        extract_with_ffmpeg(ffmpeg, &media.path)
    }
}
