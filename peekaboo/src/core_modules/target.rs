// The shared pursuit target. One writer (the sampling loop), any number of readers
// (one per motion controller). Readers always see the latest published point and
// never block the writer.

use tokio::sync::watch;

use crate::core_modules::geometry::Point;

/// The single writer side. Not `Clone`.
#[derive(Debug)]
pub struct TargetWriter {
    tx: watch::Sender<Point>,
}

/// A cheap, cloneable reader of the latest target.
#[derive(Debug, Clone)]
pub struct TargetReader {
    rx: watch::Receiver<Point>,
}

/// Creates a target holder seeded with `initial`.
pub fn target_point(initial: Point) -> (TargetWriter, TargetReader) {
    let (tx, rx) = watch::channel(initial);
    (TargetWriter { tx }, TargetReader { rx })
}

impl TargetWriter {
    pub fn publish(&self, point: Point) {
        // send_replace succeeds even when every reader is gone.
        self.tx.send_replace(point);
    }

    pub fn reader(&self) -> TargetReader {
        TargetReader {
            rx: self.tx.subscribe(),
        }
    }
}

impl TargetReader {
    pub fn latest(&self) -> Point {
        *self.rx.borrow()
    }
}
