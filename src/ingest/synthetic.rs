use anyhow::{Context, Result};
use std::io::Cursor;

use super::camera::{CameraConfig, CameraStats};

/// Synthetic camera for `stub://` devices.
///
/// Produces real JPEG frames: a gradient that shifts every tick, so
/// consecutive frames differ and every frame decodes.
pub(crate) struct SyntheticCamera {
    config: CameraConfig,
    frame_count: u64,
}

impl SyntheticCamera {
    pub(crate) fn new(config: CameraConfig) -> Self {
        Self {
            config,
            frame_count: 0,
        }
    }

    /// Synthetic cameras are always "connected".
    pub(crate) fn connect(&mut self) -> Result<()> {
        log::info!(
            "CameraSource: connected to {} (synthetic, {}x{} @ {} fps)",
            self.config.device,
            self.config.width,
            self.config.height,
            self.config.fps
        );
        Ok(())
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        self.frame_count += 1;
        let shift = self.frame_count;
        let image = image::RgbImage::from_fn(self.config.width, self.config.height, |x, y| {
            let r = ((x as u64 + shift * 7) % 256) as u8;
            let g = ((y as u64 + shift * 3) % 256) as u8;
            let b = (shift % 256) as u8;
            image::Rgb([r, g, b])
        });

        let mut encoded = Vec::new();
        image::DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut encoded), image::ImageFormat::Jpeg)
            .context("encode synthetic frame")?;
        Ok(Some(encoded))
    }

    pub(crate) fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
            healthy: true,
        }
    }
}
