//! Typed failures for the popup engine.
//!
//! Everything here except [`DetectorError`] is recoverable: it aborts a single
//! popup (or a single cleanup step) and the engine keeps running. A detector
//! failure ends the sampling loop, after which the caller still runs shutdown.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Media could not be opened, decoded or played.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to open image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("no video backend available for {0}")]
    NoVideoBackend(PathBuf),
    #[error("failed to scan media folder {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("audio playback failed for {path}: {reason}")]
    AudioPlayback { path: PathBuf, reason: String },
}

/// A temporary artifact could not be released. Logged, never propagated.
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("failed to delete temporary audio {path}: {source}")]
    TempAudio {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The window capability refused to create an overlay.
#[derive(Debug, Error)]
pub enum WindowError {
    #[error("overlay creation failed: {0}")]
    Create(String),
}

/// The presence detector stopped producing samples. Fatal to the sampling loop.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("detector stream ended")]
    StreamEnded,
    #[error("detector device error: {0}")]
    Device(String),
    #[error("detector worker panicked or was cancelled")]
    Worker(#[from] tokio::task::JoinError),
}

/// Configuration could not be loaded or is inconsistent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Why a popup could not be created.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Decode(#[from] MediaError),
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error("no images or videos available")]
    NoMedia,
    #[error("engine is shutting down")]
    ShuttingDown,
    /// Every popup was closed while this one was still being prepared.
    #[error("popups were closed before this one could be shown")]
    Closed,
    #[error("decode worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
