use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use log::{debug, warn};
use peekaboo::MediaError;
use peekaboo::PopupId;
use peekaboo::core_modules::audio::AudioSink;
use rodio::{Decoder, OutputStream, Sink};

enum Command {
    Play { popup: PopupId, track: Vec<u8> },
    Stop(PopupId),
}

/// Plays each popup's soundtrack on the default output device.
///
/// The output stream cannot leave the thread that opened it, so a dedicated
/// thread owns it along with one `Sink` per popup. Tracks are read into memory
/// before they are queued; the popup may delete its temp file right after.
pub struct SpeakerAudio {
    tx: Mutex<Sender<Command>>,
}

impl SpeakerAudio {
    pub fn new() -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("speaker".into())
            .spawn(move || run(rx))?;
        Ok(Self { tx: Mutex::new(tx) })
    }

    fn send(&self, command: Command) -> bool {
        match self.tx.lock() {
            Ok(tx) => tx.send(command).is_ok(),
            Err(poisoned) => poisoned.into_inner().send(command).is_ok(),
        }
    }
}

impl AudioSink for SpeakerAudio {
    fn play(&self, popup: PopupId, track: &Path) -> Result<(), MediaError> {
        let failed = |reason: String| MediaError::AudioPlayback {
            path: track.to_path_buf(),
            reason,
        };
        let bytes = fs::read(track).map_err(|e| failed(e.to_string()))?;
        if !self.send(Command::Play {
            popup,
            track: bytes,
        }) {
            return Err(failed("speaker thread is gone".into()));
        }
        Ok(())
    }

    fn stop(&self, popup: PopupId) {
        self.send(Command::Stop(popup));
    }
}

fn run(rx: Receiver<Command>) {
    let mut output = OutputStream::try_default().ok();
    if output.is_none() {
        warn!("audio output unavailable, soundtracks muted until a device appears");
    }
    let mut sinks: HashMap<PopupId, Sink> = HashMap::new();

    while let Ok(command) = rx.recv() {
        sinks.retain(|_, sink| !sink.empty());
        let (popup, track) = match command {
            Command::Stop(popup) => {
                if let Some(sink) = sinks.remove(&popup) {
                    sink.stop();
                    debug!("{popup} soundtrack stopped");
                }
                continue;
            }
            Command::Play { popup, track } => (popup, track),
        };

        if output.is_none() {
            output = OutputStream::try_default().ok();
        }
        let Some((_, handle)) = output.as_ref() else {
            continue;
        };
        let source = match Decoder::new(Cursor::new(track)) {
            Ok(source) => source,
            Err(e) => {
                warn!("{popup}: soundtrack not decodable: {e}");
                continue;
            }
        };
        match Sink::try_new(handle) {
            Ok(sink) => {
                sink.append(source);
                if let Some(previous) = sinks.insert(popup, sink) {
                    previous.stop();
                }
            }
            Err(e) => {
                warn!("failed to open audio sink: {e}");
                output = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_track_is_a_playback_error() {
        let speaker = SpeakerAudio::new().expect("speaker thread");
        let dir = tempfile::tempdir().expect("temp dir");
        let missing = dir.path().join("gone.wav");

        let result = speaker.play(PopupId(1), &missing);
        match result {
            Err(MediaError::AudioPlayback { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected a playback error, got {other:?}"),
        }
        // Stopping a popup that never played is harmless.
        speaker.stop(PopupId(1));
    }
}
