//! Message bus plumbing.
//!
//! Inbound bus messages are plain text. `TriggerRouter` matches each one
//! against the configured bindings: a regex for opening/extending a rolling
//! window and an exact string for a single-frame capture. Outbound
//! notifications go through the `Notifier` seam; `mqtt` provides the
//! production implementation.

pub mod mqtt;

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::fmt;
use std::path::PathBuf;

use crate::CaptureTime;

pub use mqtt::{parse_mqtt_endpoint, BusLogin, BusTopics, MqttBus, MqttEndpoint};

// ----------------------------------------------------------------------------
// Inbound triggers
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Open a rolling window, or extend the one in progress.
    Rolling,
    /// Persist the most recently captured frame.
    Capture,
}

/// Maps bus message text to triggers.
#[derive(Clone, Debug)]
pub struct TriggerRouter {
    rolling: Regex,
    capture: String,
}

impl TriggerRouter {
    pub fn new(rolling_pattern: &str, capture_message: &str) -> Result<Self> {
        let rolling = Regex::new(rolling_pattern)
            .with_context(|| format!("invalid rolling trigger pattern {}", rolling_pattern))?;
        let capture = capture_message.trim();
        if capture.is_empty() {
            return Err(anyhow!("capture trigger message must not be empty"));
        }
        Ok(Self {
            rolling,
            capture: capture.to_string(),
        })
    }

    /// Every binding the message matches, rolling first. Surrounding whitespace
    /// is ignored; the rest of the payload is opaque.
    pub fn route(&self, message: &str) -> Vec<Trigger> {
        let message = message.trim();
        let mut triggers = Vec::new();
        if self.rolling.is_match(message) {
            triggers.push(Trigger::Rolling);
        }
        if message == self.capture {
            triggers.push(Trigger::Capture);
        }
        triggers
    }
}

// ----------------------------------------------------------------------------
// Outbound notifications
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    /// A single frame was saved (or attempted) at `path`.
    Picture { path: PathBuf, timestamp: CaptureTime },
    /// A rolling window ran its countdown out.
    RollingComplete {
        window_start: CaptureTime,
        window_end: CaptureTime,
    },
}

/// Message names used when rendering notifications onto the bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageNames {
    pub picture: String,
    pub rolling_done: String,
}

impl Default for MessageNames {
    fn default() -> Self {
        Self {
            picture: "SILLCAM_PICTURE".to_string(),
            rolling_done: "SILLCAM_ROLLING_DONE".to_string(),
        }
    }
}

impl Notification {
    /// Render as a bus message: `<NAME> <path>` or `<NAME> <start_ms> <end_ms>`.
    pub fn render(&self, names: &MessageNames) -> String {
        match self {
            Self::Picture { path, .. } => format!("{} {}", names.picture, path.display()),
            Self::RollingComplete {
                window_start,
                window_end,
            } => format!("{} {} {}", names.rolling_done, window_start, window_end),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(&MessageNames::default()))
    }
}

/// Outbound side of the bus.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Notifier that only logs. Used when running without a broker.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<()> {
        log::info!("notification: {}", notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> TriggerRouter {
        TriggerRouter::new("TOKEN_.*", "SILLCAM_CAPTURE").expect("router")
    }

    #[test]
    fn rolling_pattern_matches_token_messages() {
        let router = router();
        assert_eq!(router.route("TOKEN_42 door"), vec![Trigger::Rolling]);
        assert_eq!(router.route("  TOKEN_\n"), vec![Trigger::Rolling]);
        // Unanchored, so the token may appear anywhere in the message.
        assert_eq!(router.route("door XTOKEN_1"), vec![Trigger::Rolling]);
        assert!(router.route("TOKEN-1").is_empty());
    }

    #[test]
    fn anchored_pattern_restricts_to_message_start() -> Result<()> {
        let router = TriggerRouter::new("^TOKEN_", "SILLCAM_CAPTURE")?;
        assert_eq!(router.route("TOKEN_7"), vec![Trigger::Rolling]);
        assert!(router.route("XTOKEN_7").is_empty());
        Ok(())
    }

    #[test]
    fn capture_requires_exact_message() {
        let router = router();
        assert_eq!(router.route("SILLCAM_CAPTURE"), vec![Trigger::Capture]);
        assert!(router.route("SILLCAM_CAPTURE now").is_empty());
        assert!(router.route("SILLCAM_PICTURE").is_empty());
    }

    #[test]
    fn overlapping_bindings_both_fire() -> Result<()> {
        let router = TriggerRouter::new(".*CAPTURE", "SILLCAM_CAPTURE")?;
        assert_eq!(
            router.route("SILLCAM_CAPTURE"),
            vec![Trigger::Rolling, Trigger::Capture]
        );
        Ok(())
    }

    #[test]
    fn router_rejects_bad_bindings() {
        assert!(TriggerRouter::new("TOKEN_(", "SILLCAM_CAPTURE").is_err());
        assert!(TriggerRouter::new("TOKEN_.*", "   ").is_err());
    }

    #[test]
    fn notifications_render_as_bus_messages() {
        let picture = Notification::Picture {
            path: PathBuf::from("/home/camera/img/capture1700000000.jpg"),
            timestamp: CaptureTime::from_millis(1_700_000_000_000),
        };
        assert_eq!(
            picture.to_string(),
            "SILLCAM_PICTURE /home/camera/img/capture1700000000.jpg"
        );

        let done = Notification::RollingComplete {
            window_start: CaptureTime::from_millis(1_000),
            window_end: CaptureTime::from_millis(21_000),
        };
        let names = MessageNames {
            picture: "PIC".to_string(),
            rolling_done: "DONE".to_string(),
        };
        assert_eq!(done.render(&names), "DONE 1000 21000");
    }
}
