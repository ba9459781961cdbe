use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use peekaboo::core_modules::audio::AudioSink;
use peekaboo::core_modules::library::MediaLibrary;
use peekaboo::core_modules::media::FileMediaDecoder;
use peekaboo::core_modules::window::HeadlessWindows;
use peekaboo::{
    DetectorError, EngineConfig, PopupEngine, SamplingLoop, ScriptSegment, ScriptedDetector,
};
use serde::Deserialize;

#[cfg(feature = "camera")]
mod camera;
#[cfg(feature = "speaker")]
mod speaker;

/// Drives the popup engine from a scripted presence scenario or, with the `camera`
/// feature, from a webcam face detector.
#[derive(Parser, Debug)]
#[command(name = "presence_tester", version, about)]
struct Args {
    /// JSON engine configuration; missing fields use defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Image folder (overrides the config).
    #[arg(long)]
    images: Option<PathBuf>,
    /// Video folder (overrides the config).
    #[arg(long)]
    videos: Option<PathBuf>,
    /// JSON scenario replayed as the presence signal.
    #[arg(long)]
    scenario: Option<PathBuf>,
    /// ffmpeg binary used to extract video soundtracks.
    #[arg(long)]
    ffmpeg: Option<PathBuf>,
    /// Seed for every random choice.
    #[arg(long)]
    seed: Option<u64>,
    /// Webcam index to detect faces on instead of replaying a scenario.
    #[cfg(feature = "camera")]
    #[arg(long)]
    camera: Option<i32>,
    /// Haar cascade used for face detection.
    #[cfg(feature = "camera")]
    #[arg(long, default_value = "haarcascade_frontalface_default.xml")]
    cascade: PathBuf,
}

#[derive(Debug, Deserialize)]
struct Scenario {
    segments: Vec<ScriptSegment>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();
    let args = Args::parse();

    // --- 1. Configuration ---
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = &args.images {
        config.image_dir = Some(dir.clone());
    }
    if let Some(dir) = &args.videos {
        config.video_dir = Some(dir.clone());
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    // --- 2. Media ---
    let library =
        MediaLibrary::scan(config.image_dir.as_deref(), config.video_dir.as_deref())?;
    if library.is_empty() {
        warn!("no media found, every spawn will fail");
    }
    let mut decoder = FileMediaDecoder::new();
    if let Some(ffmpeg) = &args.ffmpeg {
        decoder = decoder.with_ffmpeg(ffmpeg);
    }
    #[cfg(feature = "camera")]
    {
        decoder = decoder.with_video_backend(Arc::new(camera::OpenCvVideo));
    }

    // --- 3. Engine ---
    let windows = Arc::new(HeadlessWindows::new());
    let audio = speakers()?;
    let decoder = Arc::new(decoder);
    let (engine, target) =
        PopupEngine::new(config.clone(), windows.clone(), decoder, audio, library);
    let sampling = SamplingLoop::new(engine.clone(), target);

    // --- 4. Run until the detector stops or we are interrupted ---
    tokio::select! {
        result = sample(&args, &config, sampling) => {
            if let Err(e) = result {
                error!("sampling stopped: {e:#}");
            }
        }
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    // --- 5. Shutdown and report ---
    engine.shutdown().await;
    info!(
        "{} popups shown, {} windows left open, {} stray window calls",
        windows.created_count(),
        windows.live_count(),
        windows.stray_calls()
    );
    Ok(())
}

async fn sample(args: &Args, config: &EngineConfig, sampling: SamplingLoop) -> anyhow::Result<()> {
    #[cfg(feature = "camera")]
    if let Some(index) = args.camera {
        let detector = camera::CascadeDetector::open(index, &args.cascade, config.screen())?;
        return finished(sampling.run(detector).await);
    }

    let segments = match &args.scenario {
        Some(path) => load_scenario(path)?,
        None => default_scenario(config),
    };
    let detector = ScriptedDetector::new(&segments, config.sample_period());
    info!("replaying {} presence samples", detector.remaining());
    finished(sampling.run(detector).await)
}

#[cfg(feature = "speaker")]
fn speakers() -> anyhow::Result<Arc<dyn AudioSink>> {
    let speaker = speaker::SpeakerAudio::new().context("starting the speaker thread")?;
    Ok(Arc::new(speaker))
}

#[cfg(not(feature = "speaker"))]
fn speakers() -> anyhow::Result<Arc<dyn AudioSink>> {
    Ok(Arc::new(peekaboo::core_modules::audio::SilentAudio::new()))
}

fn finished(result: Result<(), DetectorError>) -> anyhow::Result<()> {
    match result {
        Ok(()) | Err(DetectorError::StreamEnded) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn load_scenario(path: &Path) -> anyhow::Result<Vec<ScriptSegment>> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let scenario: Scenario =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(scenario.segments)
}

/// A viewer walks in on the left, crosses to the right, then leaves.
fn default_scenario(config: &EngineConfig) -> Vec<ScriptSegment> {
    let screen = config.screen();
    let at = |fx: f64, fy: f64, secs: f64| ScriptSegment {
        present: true,
        x: screen.width * fx,
        y: screen.height * fy,
        secs,
    };
    vec![
        at(0.25, 0.4, 8.0),
        at(0.75, 0.6, 8.0),
        ScriptSegment {
            present: false,
            x: 0.0,
            y: 0.0,
            secs: 3.0,
        },
    ]
}
