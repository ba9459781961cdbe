// THEORY:
// This file is the main entry point for the `peekaboo` library crate. It defines the
// public API exposed to drivers such as the `presence_tester` binary.
//
// The high-level interface is `PopupEngine` (spawn, close-all, shutdown) fed by a
// `SamplingLoop` that turns a presence `Detector` into spawn and close decisions.
// The building blocks in `core_modules` stay public so that hosts can plug in their
// own window system, media decoder and audio sink, and so that tests can drive the
// pieces in isolation.

pub mod config;
pub mod core_modules;
pub mod engine;
pub mod error;
pub mod sampling;

pub use config::EngineConfig;
pub use core_modules::geometry::{Point, Rect, Size};
pub use core_modules::popup::{PopupId, PopupState};
pub use engine::PopupEngine;
pub use error::{ConfigError, DetectorError, EngineError, MediaError};
pub use sampling::{Detector, PresenceSample, SamplingLoop, ScriptSegment, ScriptedDetector};
