//! V4L2 camera backend.
//!
//! Opens a local device node (e.g., /dev/video0), requests MJPG at the
//! configured resolution and rate, and hands each dequeued buffer back as-is.
//! MJPG buffers are complete JPEG images, so nothing is decoded here.
//! Dequeues wait at most two frame periods; a stalled device reads as a miss.

use anyhow::{Context, Result};
use ouroboros::self_referencing;
use std::time::{Duration, Instant};

use super::camera::{CameraConfig, CameraStats};

const MMAP_BUFFERS: u32 = 4;
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(500);

pub struct V4l2Camera {
    config: CameraConfig,
    state: Option<V4l2StreamState>,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
}

#[self_referencing]
struct V4l2StreamState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Camera {
    pub(crate) fn new(config: CameraConfig) -> Self {
        Self {
            config,
            state: None,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        }
    }

    pub(crate) fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.device)
            .with_context(|| format!("open v4l2 device {}", self.config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"MJPG");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Camera: failed to set MJPG format on {}: {}",
                    self.config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        let params = v4l::video::capture::Parameters::with_fps(self.config.fps);
        if let Err(err) = device.set_params(&params) {
            log::warn!(
                "V4l2Camera: failed to set fps on {}: {}",
                self.config.device,
                err
            );
        }

        let mut state = V4l2StreamStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, MMAP_BUFFERS)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()
        .map_err(|err| {
            self.last_error = Some(err.to_string());
            err
        })?;
        let timeout = read_timeout(self.config.fps);
        state.with_mut(|fields| fields.stream.set_timeout(timeout));
        self.state = Some(state);
        self.last_error = None;

        log::info!(
            "V4l2Camera: connected to {} ({}x{} {})",
            self.config.device,
            format.width,
            format.height,
            format.fourcc
        );
        Ok(())
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let (buf, meta) = match state.with_mut(|fields| fields.stream.next()) {
            Ok(frame) => frame,
            Err(err) if err.kind() == std::io::ErrorKind::TimedOut => {
                self.last_error = Some(format!("no frame within {:?}", read_timeout(self.config.fps)));
                return Ok(None);
            }
            Err(err) => {
                self.last_error = Some(err.to_string());
                return Err(anyhow::Error::new(err).context("capture v4l2 frame"));
            }
        };

        let used = (meta.bytesused as usize).min(buf.len());
        if used == 0 {
            return Ok(None);
        }

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        self.last_error = None;
        Ok(Some(buf[..used].to_vec()))
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return self.state.is_some();
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    pub(crate) fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
            healthy: self.is_healthy(),
        }
    }

    fn health_grace(&self) -> Duration {
        let base_ms = (1000 / self.config.fps.max(1)).saturating_mul(6);
        Duration::from_millis(base_ms.max(2_000) as u64)
    }
}

/// How long one dequeue may wait: two frame periods, never below half a second.
fn read_timeout(fps: u32) -> Duration {
    let period = Duration::from_secs(1) / fps.max(1);
    (period * 2).max(MIN_READ_TIMEOUT)
}
