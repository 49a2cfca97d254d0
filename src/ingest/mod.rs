//! Frame ingestion sources.
//!
//! This module provides the camera the capture scheduler pulls from:
//! - Synthetic camera (`stub://` device paths, testing and demos)
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! Sources hand back encoded image bytes, or `None` when the device had
//! nothing for this tick. Timestamps are applied by the recorder at capture.

pub mod camera;
mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;

pub use camera::{CameraConfig, CameraSource, CameraStats};

/// Anything the capture scheduler can pull frames from.
///
/// `next_frame` must not block indefinitely. An `Err` or `Ok(None)` is treated
/// as a missed tick.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>>;

    /// Device counters for the periodic health log.
    fn stats(&self) -> Option<CameraStats> {
        None
    }
}
