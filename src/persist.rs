//! Frame persistence.
//!
//! `Persister::persist` is the one write path shared by the rolling window,
//! the single-frame handler and the history worker. It is best-effort: a slot
//! that fails validation or a codec/disk error is logged and the current time
//! is handed back in place of the frame stamp. Callers never branch on it.

use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::frame::Frame;
use crate::CaptureTime;

const SECS_PLACEHOLDER: &str = "{secs}";
const MS_PLACEHOLDER: &str = "{ms}";

// ----------------------------------------------------------------------------
// OutputTemplate
// ----------------------------------------------------------------------------

/// Output path template.
///
/// `{secs}` is replaced with the capture time in unix seconds and `{ms}` with
/// unix milliseconds. At least one of them must be present.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputTemplate {
    template: String,
}

impl OutputTemplate {
    pub fn new(template: &str) -> Result<Self> {
        if template.trim().is_empty() {
            return Err(anyhow!("output template must not be empty"));
        }
        if !template.contains(SECS_PLACEHOLDER) && !template.contains(MS_PLACEHOLDER) {
            return Err(anyhow!(
                "output template {} must contain {} or {}",
                template,
                SECS_PLACEHOLDER,
                MS_PLACEHOLDER
            ));
        }
        Ok(Self {
            template: template.to_string(),
        })
    }

    pub fn render(&self, timestamp: CaptureTime) -> PathBuf {
        let rendered = self
            .template
            .replace(SECS_PLACEHOLDER, &timestamp.as_secs().to_string())
            .replace(MS_PLACEHOLDER, &timestamp.as_millis().to_string());
        PathBuf::from(rendered)
    }
}

// ----------------------------------------------------------------------------
// Codec
// ----------------------------------------------------------------------------

/// Decodes captured bytes and writes them out as an image file.
pub trait FrameCodec: Send + Sync {
    fn write(&self, bytes: &[u8], path: &Path) -> Result<()>;
}

/// `image`-backed codec. The output format follows the path extension.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageCodec;

impl FrameCodec for ImageCodec {
    fn write(&self, bytes: &[u8], path: &Path) -> Result<()> {
        let image = image::load_from_memory(bytes).context("decode frame")?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create output directory {}", parent.display()))?;
            }
        }
        image
            .save(path)
            .with_context(|| format!("write image {}", path.display()))?;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Persister
// ----------------------------------------------------------------------------

/// A frame that made it to disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Persisted {
    pub timestamp: CaptureTime,
    pub path: PathBuf,
}

/// Why a slot was not written.
#[derive(Debug)]
pub enum PersistFailure {
    Absent,
    TooShort { len: usize, min: usize },
    ImplausibleTimestamp(CaptureTime),
    Codec(anyhow::Error),
}

impl fmt::Display for PersistFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "slot holds no frame"),
            Self::TooShort { len, min } => {
                write!(f, "frame too short ({} bytes, need {})", len, min)
            }
            Self::ImplausibleTimestamp(ts) => write!(f, "implausible capture time {}", ts),
            Self::Codec(err) => write!(f, "codec failure: {:#}", err),
        }
    }
}

impl std::error::Error for PersistFailure {}

#[derive(Clone)]
pub struct Persister {
    template: OutputTemplate,
    codec: Arc<dyn FrameCodec>,
    min_frame_bytes: usize,
}

impl Persister {
    pub fn new(template: OutputTemplate, codec: Arc<dyn FrameCodec>, min_frame_bytes: usize) -> Self {
        Self {
            template,
            codec,
            min_frame_bytes,
        }
    }

    pub fn template(&self) -> &OutputTemplate {
        &self.template
    }

    /// Validate and write one slot. The codec only ever sees frames that passed
    /// validation.
    pub fn try_persist(&self, slot: Option<&Frame>) -> Result<Persisted, PersistFailure> {
        let frame = slot.ok_or(PersistFailure::Absent)?;
        if frame.len() < self.min_frame_bytes {
            return Err(PersistFailure::TooShort {
                len: frame.len(),
                min: self.min_frame_bytes,
            });
        }
        if !frame.captured_at.is_plausible(CaptureTime::now()) {
            return Err(PersistFailure::ImplausibleTimestamp(frame.captured_at));
        }

        let path = self.template.render(frame.captured_at);
        self.codec
            .write(frame.bytes(), &path)
            .map_err(PersistFailure::Codec)?;
        Ok(Persisted {
            timestamp: frame.captured_at,
            path,
        })
    }

    /// Best-effort write. Returns the frame's capture time, or the current time
    /// if nothing was written.
    pub fn persist(&self, slot: Option<&Frame>) -> CaptureTime {
        match self.try_persist(slot) {
            Ok(persisted) => {
                log::debug!("wrote image to {}", persisted.path.display());
                persisted.timestamp
            }
            Err(PersistFailure::Absent) => {
                log::debug!("persist skipped: slot holds no frame");
                CaptureTime::now()
            }
            Err(e) => {
                log::warn!("persist skipped: {}", e);
                CaptureTime::now()
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
