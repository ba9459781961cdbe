// THEORY:
// OpenCV-backed collaborators for running the engine against the real world: a
// webcam face detector that produces the presence signal and a video backend that
// decodes `.mp4` popups frame by frame.
//
// The detector maps the centre of the largest detected face from camera
// coordinates to screen coordinates proportionally; that point is the target the
// popups drift toward.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use image::RgbaImage;
use opencv::{
    core::{Mat, Rect, Size as CvSize, Vector},
    imgproc,
    objdetect::CascadeClassifier,
    prelude::*,
    videoio::{self, VideoCapture},
};
use peekaboo::core_modules::media::{FrameSource, VideoBackend};
use peekaboo::{DetectorError, MediaError, Point, PresenceSample, Size};

const FALLBACK_FRAME_INTERVAL: Duration = Duration::from_millis(30);

/// Haar-cascade face detector on a webcam.
pub struct CascadeDetector {
    capture: VideoCapture,
    cascade: CascadeClassifier,
    screen: Size,
    frame: Mat,
}

impl CascadeDetector {
    pub fn open(index: i32, cascade: &Path, screen: Size) -> anyhow::Result<Self> {
        let capture = VideoCapture::new(index, videoio::CAP_ANY)?;
        if !capture.is_opened()? {
            bail!("could not open camera {index}");
        }
        let cascade_path = cascade.to_str().context("cascade path is not valid UTF-8")?;
        let cascade = CascadeClassifier::new(cascade_path)
            .with_context(|| format!("loading cascade {}", cascade.display()))?;
        Ok(Self {
            capture,
            cascade,
            screen,
            frame: Mat::default(),
        })
    }

    fn detect(&mut self) -> opencv::Result<Option<PresenceSample>> {
        if !self.capture.read(&mut self.frame)? || self.frame.empty() {
            return Ok(None);
        }
        let mut gray = Mat::default();
        imgproc::cvt_color(&self.frame, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;

        let mut faces = Vector::<Rect>::new();
        self.cascade.detect_multi_scale(
            &gray,
            &mut faces,
            1.1,
            5,
            0,
            CvSize::new(30, 30),
            CvSize::new(0, 0),
        )?;
        let Some(face) = faces.iter().max_by_key(|f| f.area()) else {
            return Ok(Some(PresenceSample::absent()));
        };

        let cols = self.frame.cols().max(1) as f64;
        let rows = self.frame.rows().max(1) as f64;
        let cx = face.x as f64 + face.width as f64 / 2.0;
        let cy = face.y as f64 + face.height as f64 / 2.0;
        Ok(Some(PresenceSample::present_at(Point::new(
            cx / cols * self.screen.width,
            cy / rows * self.screen.height,
        ))))
    }
}

impl peekaboo::Detector for CascadeDetector {
    fn poll(&mut self) -> Result<PresenceSample, DetectorError> {
        match self.detect() {
            Ok(Some(sample)) => Ok(sample),
            Ok(None) => Err(DetectorError::StreamEnded),
            Err(e) => Err(DetectorError::Device(e.to_string())),
        }
    }
}

/// Decodes video popups with OpenCV.
pub struct OpenCvVideo;

impl VideoBackend for OpenCvVideo {
    fn open(&self, path: &Path, size: Size) -> Result<Box<dyn FrameSource>, MediaError> {
        let decode = |reason: String| MediaError::Decode {
            path: path.to_path_buf(),
            reason,
        };
        let name = path.to_str().ok_or_else(|| decode("path is not valid UTF-8".into()))?;
        let capture =
            VideoCapture::from_file(name, videoio::CAP_ANY).map_err(|e| decode(e.to_string()))?;
        if !capture.is_opened().map_err(|e| decode(e.to_string()))? {
            return Err(decode("could not open video".into()));
        }
        let fps = capture.get(videoio::CAP_PROP_FPS).unwrap_or(0.0);
        let interval = if fps > 0.0 {
            Duration::from_secs_f64(1.0 / fps)
        } else {
            FALLBACK_FRAME_INTERVAL
        };
        let (width, height) = size.pixels();
        Ok(Box::new(OpenCvClip {
            capture,
            path: path.to_path_buf(),
            interval,
            width,
            height,
        }))
    }
}

struct OpenCvClip {
    capture: VideoCapture,
    path: std::path::PathBuf,
    interval: Duration,
    width: u32,
    height: u32,
}

impl OpenCvClip {
    fn read(&mut self) -> opencv::Result<Option<RgbaImage>> {
        let mut frame = Mat::default();
        if !self.capture.read(&mut frame)? || frame.empty() {
            return Ok(None);
        }
        let mut rgba = Mat::default();
        imgproc::cvt_color(&frame, &mut rgba, imgproc::COLOR_BGR2RGBA, 0)?;
        let mut scaled = Mat::default();
        imgproc::resize(
            &rgba,
            &mut scaled,
            CvSize::new(self.width as i32, self.height as i32),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;
        let bytes = scaled.data_bytes()?.to_vec();
        Ok(RgbaImage::from_raw(self.width, self.height, bytes))
    }
}

impl FrameSource for OpenCvClip {
    fn frame_interval(&self) -> Duration {
        self.interval
    }

    fn next_frame(&mut self) -> Option<Result<RgbaImage, MediaError>> {
        match self.read() {
            Ok(frame) => frame.map(Ok),
            Err(e) => Some(Err(MediaError::Decode {
                path: self.path.clone(),
                reason: e.to_string(),
            })),
        }
    }
}
