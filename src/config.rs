use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::ingest::CameraConfig;
use crate::persist::OutputTemplate;
use crate::recorder::RecorderConfig;
use crate::transport::{BusLogin, BusTopics, MessageNames, TriggerRouter};

const DEFAULT_BROKER_ADDR: &str = "127.0.0.1:1883";
const DEFAULT_CLIENT_ID: &str = "sillcam";
const DEFAULT_TRIGGER_TOPIC: &str = "sillcam/bus";
const DEFAULT_NOTIFY_TOPIC: &str = "sillcam/events";
const DEFAULT_AVAILABILITY_TOPIC: &str = "sillcam/status";
const DEFAULT_ROLLING_PATTERN: &str = "TOKEN_.*";
const DEFAULT_CAPTURE_MESSAGE: &str = "SILLCAM_CAPTURE";
const DEFAULT_PICTURE_MESSAGE: &str = "SILLCAM_PICTURE";
const DEFAULT_ROLLING_DONE_MESSAGE: &str = "SILLCAM_ROLLING_DONE";
const DEFAULT_OUTPUT_TEMPLATE: &str = "/home/camera/img/capture{secs}.jpg";
const DEFAULT_MIN_FRAME_BYTES: usize = 100;
const DEFAULT_HISTORY_SIZE: usize = 10;
const DEFAULT_SAVE_PERIOD: u32 = 20;
const DEFAULT_THROTTLE_MS: u64 = 50;

#[derive(Debug, Deserialize, Default)]
struct SillcamConfigFile {
    bus: Option<BusConfigFile>,
    camera: Option<CameraConfigFile>,
    output: Option<OutputConfigFile>,
    history: Option<HistoryConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct BusConfigFile {
    broker_addr: Option<String>,
    client_id: Option<String>,
    username: Option<String>,
    password: Option<String>,
    trigger_topic: Option<String>,
    notify_topic: Option<String>,
    availability_topic: Option<String>,
    rolling_pattern: Option<String>,
    capture_message: Option<String>,
    picture_message: Option<String>,
    rolling_done_message: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    template: Option<String>,
    min_frame_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct HistoryConfigFile {
    size: Option<usize>,
    save_period: Option<u32>,
    throttle_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SillcamConfig {
    pub bus: BusSettings,
    pub camera: CameraConfig,
    pub output: OutputSettings,
    pub history: HistorySettings,
}

#[derive(Debug, Clone)]
pub struct BusSettings {
    pub broker_addr: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub trigger_topic: String,
    pub notify_topic: String,
    pub availability_topic: String,
    pub rolling_pattern: String,
    pub capture_message: String,
    pub picture_message: String,
    pub rolling_done_message: String,
}

#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub template: String,
    pub min_frame_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct HistorySettings {
    pub size: usize,
    pub save_period: u32,
    pub throttle: Duration,
}

impl SillcamConfig {
    /// Load from `path`, or from `SILLCAM_CONFIG` when no path is given.
    /// Without either, defaults apply. Environment overrides win over the file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("SILLCAM_CONFIG")
            .ok()
            .filter(|p| !p.trim().is_empty());
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => match env_path.as_deref() {
                Some(p) => Some(read_config_file(Path::new(p))?),
                None => None,
            },
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SillcamConfigFile) -> Self {
        let bus = file.bus.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let output = file.output.unwrap_or_default();
        let history = file.history.unwrap_or_default();
        let camera_defaults = CameraConfig::default();

        Self {
            bus: BusSettings {
                broker_addr: bus
                    .broker_addr
                    .unwrap_or_else(|| DEFAULT_BROKER_ADDR.to_string()),
                client_id: bus
                    .client_id
                    .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
                username: bus.username,
                password: bus.password,
                trigger_topic: bus
                    .trigger_topic
                    .unwrap_or_else(|| DEFAULT_TRIGGER_TOPIC.to_string()),
                notify_topic: bus
                    .notify_topic
                    .unwrap_or_else(|| DEFAULT_NOTIFY_TOPIC.to_string()),
                availability_topic: bus
                    .availability_topic
                    .unwrap_or_else(|| DEFAULT_AVAILABILITY_TOPIC.to_string()),
                rolling_pattern: bus
                    .rolling_pattern
                    .unwrap_or_else(|| DEFAULT_ROLLING_PATTERN.to_string()),
                capture_message: bus
                    .capture_message
                    .unwrap_or_else(|| DEFAULT_CAPTURE_MESSAGE.to_string()),
                picture_message: bus
                    .picture_message
                    .unwrap_or_else(|| DEFAULT_PICTURE_MESSAGE.to_string()),
                rolling_done_message: bus
                    .rolling_done_message
                    .unwrap_or_else(|| DEFAULT_ROLLING_DONE_MESSAGE.to_string()),
            },
            camera: CameraConfig {
                device: camera.device.unwrap_or(camera_defaults.device),
                width: camera.width.unwrap_or(camera_defaults.width),
                height: camera.height.unwrap_or(camera_defaults.height),
                fps: camera.fps.unwrap_or(camera_defaults.fps),
            },
            output: OutputSettings {
                template: output
                    .template
                    .unwrap_or_else(|| DEFAULT_OUTPUT_TEMPLATE.to_string()),
                min_frame_bytes: output.min_frame_bytes.unwrap_or(DEFAULT_MIN_FRAME_BYTES),
            },
            history: HistorySettings {
                size: history.size.unwrap_or(DEFAULT_HISTORY_SIZE),
                save_period: history.save_period.unwrap_or(DEFAULT_SAVE_PERIOD),
                throttle: Duration::from_millis(history.throttle_ms.unwrap_or(DEFAULT_THROTTLE_MS)),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        override_string("SILLCAM_BROKER_ADDR", &mut self.bus.broker_addr);
        override_string("SILLCAM_CLIENT_ID", &mut self.bus.client_id);
        override_string("SILLCAM_TRIGGER_TOPIC", &mut self.bus.trigger_topic);
        override_string("SILLCAM_NOTIFY_TOPIC", &mut self.bus.notify_topic);
        override_string("SILLCAM_AVAILABILITY_TOPIC", &mut self.bus.availability_topic);
        override_string("SILLCAM_DEVICE", &mut self.camera.device);
        override_string("SILLCAM_OUTPUT_TEMPLATE", &mut self.output.template);
        if let Some(user) = env_value("SILLCAM_MQTT_USERNAME") {
            self.bus.username = Some(user);
        }
        if let Some(password) = env_value("SILLCAM_MQTT_PASSWORD") {
            self.bus.password = Some(password);
        }
        if let Some(fps) = env_value("SILLCAM_FPS") {
            self.camera.fps = fps
                .parse()
                .map_err(|_| anyhow!("SILLCAM_FPS must be a positive integer"))?;
        }
        if let Some(size) = env_value("SILLCAM_HISTORY_SIZE") {
            self.history.size = size
                .parse()
                .map_err(|_| anyhow!("SILLCAM_HISTORY_SIZE must be a positive integer"))?;
        }
        if let Some(period) = env_value("SILLCAM_SAVE_PERIOD") {
            self.history.save_period = period.parse().map_err(|_| {
                anyhow!("SILLCAM_SAVE_PERIOD must be a positive number of ticks")
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.history.size == 0 {
            return Err(anyhow!("history size must be greater than zero"));
        }
        if self.history.save_period == 0 {
            return Err(anyhow!("save period must be greater than zero"));
        }
        if self.camera.fps == 0 {
            return Err(anyhow!("camera fps must be greater than zero"));
        }
        if self.bus.trigger_topic.trim().is_empty() || self.bus.notify_topic.trim().is_empty() {
            return Err(anyhow!("bus topics must not be empty"));
        }
        self.trigger_router()?;
        OutputTemplate::new(&self.output.template)?;
        Ok(())
    }

    pub fn trigger_router(&self) -> Result<TriggerRouter> {
        TriggerRouter::new(&self.bus.rolling_pattern, &self.bus.capture_message)
    }

    pub fn message_names(&self) -> MessageNames {
        MessageNames {
            picture: self.bus.picture_message.clone(),
            rolling_done: self.bus.rolling_done_message.clone(),
        }
    }

    pub fn bus_topics(&self) -> BusTopics {
        BusTopics {
            trigger: self.bus.trigger_topic.clone(),
            notify: self.bus.notify_topic.clone(),
            availability: self.bus.availability_topic.clone(),
        }
    }

    pub fn bus_login(&self) -> BusLogin {
        BusLogin {
            client_id: self.bus.client_id.clone(),
            username: self.bus.username.clone(),
            password: self.bus.password.clone(),
        }
    }

    pub fn output_template(&self) -> Result<OutputTemplate> {
        OutputTemplate::new(&self.output.template)
    }

    pub fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            history_size: self.history.size,
            save_period: self.history.save_period,
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn override_string(key: &str, target: &mut String) {
    if let Some(value) = env_value(key) {
        *target = value;
    }
}

fn read_config_file(path: &Path) -> Result<SillcamConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
