// THEORY:
// Video popups carry a soundtrack. The soundtrack is pulled out of the container by
// an external `ffmpeg` into a temporary `.wav` file, played through an `AudioSink`,
// and deleted when the popup is destroyed. `TempAudio` owns that file: it is removed
// on an explicit `release` (where a failure is reported) and, as a backstop, when the
// value is dropped on any other exit path.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;

use log::{debug, warn};
use tempfile::TempPath;

use crate::core_modules::lock;
use crate::core_modules::popup::PopupId;
use crate::error::{CleanupError, MediaError};

/// A temporary decoded-audio file, deleted when released or dropped.
#[derive(Debug)]
pub struct TempAudio {
    path: TempPath,
}

impl TempAudio {
    /// Reserves a fresh, empty `.wav` file in the system temp directory.
    pub fn create() -> std::io::Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("peekaboo-")
            .suffix(".wav")
            .tempfile()?;
        Ok(Self {
            path: file.into_temp_path(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the file now, reporting a failure instead of swallowing it.
    pub fn release(self) -> Result<(), CleanupError> {
        let path = self.path.to_path_buf();
        self.path
            .close()
            .map_err(|source| CleanupError::TempAudio { path, source })
    }
}

impl From<TempPath> for TempAudio {
    fn from(path: TempPath) -> Self {
        Self { path }
    }
}

/// Extracts the audio track of `video` into a temporary `.wav` with `ffmpeg`.
/// Returns `None` (after logging) when there is no usable track.
pub fn extract_with_ffmpeg(ffmpeg: &Path, video: &Path) -> Option<TempAudio> {
    let audio = match TempAudio::create() {
        Ok(audio) => audio,
        Err(e) => {
            warn!("could not reserve temp audio for {}: {e}", video.display());
            return None;
        }
    };

    let status = Command::new(ffmpeg)
        .arg("-i")
        .arg(video)
        .args(["-vn", "-acodec", "pcm_s16le", "-ar", "44100", "-ac", "2", "-y"])
        .arg(audio.path())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(s) if s.success() => {
            debug!("extracted audio of {} to {}", video.display(), audio.path().display());
            Some(audio)
        }
        Ok(s) => {
            warn!("ffmpeg exited with {s} for {}", video.display());
            None
        }
        Err(e) => {
            warn!("failed to run {}: {e}", ffmpeg.display());
            None
        }
    }
}

/// Plays popup soundtracks.
pub trait AudioSink: Send + Sync {
    fn play(&self, popup: PopupId, track: &Path) -> Result<(), MediaError>;
    fn stop(&self, popup: PopupId);
}

/// An `AudioSink` with no output device; it only remembers what is playing.
#[derive(Default)]
pub struct SilentAudio {
    playing: Mutex<HashSet<PopupId>>,
    history: Mutex<Vec<(PopupId, PathBuf)>>,
}

impl SilentAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn playing_count(&self) -> usize {
        lock(&self.playing).len()
    }

    pub fn played(&self) -> Vec<(PopupId, PathBuf)> {
        lock(&self.history).clone()
    }
}

impl AudioSink for SilentAudio {
    fn play(&self, popup: PopupId, track: &Path) -> Result<(), MediaError> {
        debug!("{popup} playing {}", track.display());
        lock(&self.playing).insert(popup);
        lock(&self.history).push((popup, track.to_path_buf()));
        Ok(())
    }

    fn stop(&self, popup: PopupId) {
        if lock(&self.playing).remove(&popup) {
            debug!("{popup} audio stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_deletes_the_file() {
        let audio = TempAudio::create().expect("temp file");
        let path = audio.path().to_path_buf();
        assert!(path.exists());
        audio.release().expect("release");
        assert!(!path.exists());
    }

    #[test]
    fn drop_deletes_the_file() {
        let audio = TempAudio::create().expect("temp file");
        let path = audio.path().to_path_buf();
        drop(audio);
        assert!(!path.exists());
    }

    #[test]
    fn missing_ffmpeg_yields_no_track() {
        let track = extract_with_ffmpeg(Path::new("/nonexistent/ffmpeg"), Path::new("clip.mp4"));
        assert!(track.is_none());
    }
}
