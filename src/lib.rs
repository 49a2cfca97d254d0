//! Sill camera controller
//!
//! This crate implements a continuously-running capture service for a single
//! fixed camera. It keeps the most recent frames in a rolling history and
//! writes them to disk when asked to over the message bus.
//!
//! # Architecture
//!
//! Three actors share one [`Recorder`]:
//!
//! 1. **Capture scheduler**: a deadline-paced loop that pulls one frame per tick
//!    into the ring and drives the rolling-save countdown.
//! 2. **Trigger handlers**: one short-lived thread per inbound bus message,
//!    either opening/extending a rolling window or saving the latest frame.
//! 3. **History worker**: a low-priority thread that writes a private copy of
//!    the whole ring when a rolling window opens fresh.
//!
//! The ring, the write cursor and the rolling-save state live behind a single
//! mutex inside the recorder. The history worker never touches that mutex.
//!
//! # Module Structure
//!
//! - `frame`: `Frame` and the fixed-capacity `SnapshotRing`
//! - `ingest`: frame sources (synthetic, V4L2)
//! - `persist`: output template, image codec and the best-effort `Persister`
//! - `history`: background bulk dump worker
//! - `recorder`: shared context, save coordinator, single-frame handler
//! - `scheduler`: deadline pacing and the capture loop
//! - `transport`: trigger routing, notifications and the MQTT adapter
//! - `config`: layered daemon configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod config;
pub mod frame;
pub mod history;
pub mod ingest;
pub mod persist;
pub mod recorder;
pub mod scheduler;
pub mod transport;

pub use frame::{Frame, SnapshotRing};
pub use history::{DumpReport, DumpTicket, HistoryWorker};
pub use ingest::{CameraConfig, CameraSource, CameraStats, FrameSource};
pub use persist::{FrameCodec, ImageCodec, OutputTemplate, Persister};
pub use recorder::{
    Recorder, RecorderConfig, RecorderStats, RecorderStatus, RollingTrigger, TickReport,
};
pub use scheduler::{CaptureHealth, CaptureScheduler, Pacer};
pub use transport::{LogNotifier, MessageNames, Notification, Notifier, Trigger, TriggerRouter};

// -------------------- Capture Time --------------------

/// Frames stamped before this instant (2000-01-01T00:00:00Z) are treated as
/// coming from a device with an unset clock.
const EARLIEST_PLAUSIBLE_MS: u64 = 946_684_800_000;

/// How far ahead of the local clock a capture stamp may drift.
const FUTURE_TOLERANCE: Duration = Duration::from_secs(60 * 60 * 24);

/// Wall-clock capture instant, in milliseconds since the unix epoch.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CaptureTime {
    pub epoch_ms: u64,
}

impl CaptureTime {
    pub fn now() -> Self {
        // A clock set before 1970 reads as zero, which fails the plausibility check.
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self { epoch_ms }
    }

    pub fn from_millis(epoch_ms: u64) -> Self {
        Self { epoch_ms }
    }

    pub fn as_millis(self) -> u64 {
        self.epoch_ms
    }

    pub fn as_secs(self) -> u64 {
        self.epoch_ms / 1000
    }

    /// A stamp is plausible when it falls after 2000-01-01 and no more than a
    /// day ahead of `reference`.
    pub fn is_plausible(self, reference: CaptureTime) -> bool {
        let ceiling = reference
            .epoch_ms
            .saturating_add(FUTURE_TOLERANCE.as_millis() as u64);
        self.epoch_ms >= EARLIEST_PLAUSIBLE_MS && self.epoch_ms <= ceiling
    }
}

impl fmt::Display for CaptureTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.epoch_ms)
    }
}
